//! The identity a certificate is requested for.
use const_oid::{
    ObjectIdentifier,
    db::{rfc3280, rfc4519},
};
use snafu::{ResultExt, Snafu, ensure};
use x509_cert::{
    attr::AttributeTypeAndValue,
    der::{
        Any,
        asn1::{Ia5StringRef, PrintableStringRef, Utf8StringRef},
    },
    name::{Name, RdnSequence, RelativeDistinguishedName},
};

/// The labels of the subject fields, in the order they are passed in and
/// rendered.
pub const SUBJECT_FIELD_LABELS: [&str; 7] = ["CN", "OU", "O", "L", "ST", "C", "E"];

#[derive(Debug, Snafu)]
pub enum SubjectError {
    #[snafu(display(
        "expected {} subject fields (CN, OU, O, L, ST, C, E), got {count}",
        SUBJECT_FIELD_LABELS.len()
    ))]
    FieldCount { count: usize },

    #[snafu(display("subject field {label} must not be empty"))]
    EmptyField { label: &'static str },

    #[snafu(display("common name {common_name:?} cannot be used as a directory or file name"))]
    InvalidCommonName { common_name: String },

    #[snafu(display("failed to encode subject field {label} as {string_type}"))]
    EncodeField {
        source: x509_cert::der::Error,
        label: &'static str,
        string_type: &'static str,
    },

    #[snafu(display("failed to assemble relative distinguished name for {label}"))]
    AssembleName {
        source: x509_cert::der::Error,
        label: &'static str,
    },
}

/// Ordered subject identity: CN, OU, O, L, ST, C and the contact email (E).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub common_name: String,
    pub organizational_unit: String,
    pub organization: String,
    pub locality: String,
    pub state: String,
    pub country: String,
    pub email: String,
}

impl SubjectIdentity {
    /// Builds the identity from exactly seven non-blank fields in the order
    /// CN, OU, O, L, ST, C, E. The values are kept exactly as given.
    pub fn from_fields<S>(fields: &[S]) -> Result<Self, SubjectError>
    where
        S: AsRef<str>,
    {
        let [cn, ou, o, l, st, c, e] = fields else {
            return FieldCountSnafu {
                count: fields.len(),
            }
            .fail();
        };

        let values = [cn, ou, o, l, st, c, e].map(|field| field.as_ref());
        for (label, value) in SUBJECT_FIELD_LABELS.iter().zip(values) {
            ensure!(!value.trim().is_empty(), EmptyFieldSnafu { label: *label });
        }

        let [cn, ou, o, l, st, c, e] = values;
        validate_common_name(cn)?;

        Ok(Self {
            common_name: cn.to_owned(),
            organizational_unit: ou.to_owned(),
            organization: o.to_owned(),
            locality: l.to_owned(),
            state: st.to_owned(),
            country: c.to_owned(),
            email: e.to_owned(),
        })
    }

    fn fields(&self) -> [(&'static str, &str); 7] {
        [
            ("CN", self.common_name.as_str()),
            ("OU", self.organizational_unit.as_str()),
            ("O", self.organization.as_str()),
            ("L", self.locality.as_str()),
            ("ST", self.state.as_str()),
            ("C", self.country.as_str()),
            ("E", self.email.as_str()),
        ]
    }

    /// Renders `CN=..,OU=..,O=..,L=..,ST=..,C=..,E=..`.
    pub fn distinguished_name(&self) -> String {
        let mut rendered = String::new();
        for (index, (label, value)) in self.fields().into_iter().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(label);
            rendered.push('=');
            push_escaped(&mut rendered, value);
        }
        rendered
    }

    /// Converts the identity into an X.509 [`Name`].
    ///
    /// The RDNs are stored most significant first (E down to CN), so that the
    /// usual rendering lists the common name first.
    pub fn to_name(&self) -> Result<Name, SubjectError> {
        let mut rdns = Vec::with_capacity(SUBJECT_FIELD_LABELS.len());

        for (label, value) in self.fields().into_iter().rev() {
            let (oid, encoded) = match label {
                "C" => (
                    rfc4519::C,
                    PrintableStringRef::new(value)
                        .and_then(|value| Any::encode_from(&value))
                        .context(EncodeFieldSnafu {
                            label,
                            string_type: "PrintableString",
                        })?,
                ),
                "E" => (
                    rfc3280::EMAIL_ADDRESS,
                    Ia5StringRef::new(value)
                        .and_then(|value| Any::encode_from(&value))
                        .context(EncodeFieldSnafu {
                            label,
                            string_type: "IA5String",
                        })?,
                ),
                _ => (
                    label_oid(label),
                    Utf8StringRef::new(value)
                        .and_then(|value| Any::encode_from(&value))
                        .context(EncodeFieldSnafu {
                            label,
                            string_type: "UTF8String",
                        })?,
                ),
            };

            let attribute = AttributeTypeAndValue {
                oid,
                value: encoded,
            };
            let rdn = RelativeDistinguishedName::try_from(vec![attribute])
                .context(AssembleNameSnafu { label })?;
            rdns.push(rdn);
        }

        Ok(RdnSequence(rdns))
    }
}

/// Rejects common names which would escape the per-subject directories.
pub fn validate_common_name(common_name: &str) -> Result<(), SubjectError> {
    let invalid = common_name.is_empty()
        || common_name == "."
        || common_name == ".."
        || common_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());

    ensure!(
        !invalid,
        InvalidCommonNameSnafu {
            common_name: common_name.to_owned()
        }
    );
    Ok(())
}

/// Renders a [`Name`] the same way [`SubjectIdentity::distinguished_name`]
/// does, including the `E` label for `emailAddress`.
pub fn render_name(name: &Name) -> String {
    let mut rendered = String::new();

    for (index, rdn) in name.0.iter().rev().enumerate() {
        if index > 0 {
            rendered.push(',');
        }

        for (position, attribute) in rdn.0.iter().enumerate() {
            if position > 0 {
                rendered.push('+');
            }

            match oid_label(&attribute.oid) {
                Some(label) => rendered.push_str(label),
                None => rendered.push_str(&attribute.oid.to_string()),
            }
            rendered.push('=');
            push_escaped(
                &mut rendered,
                &String::from_utf8_lossy(attribute.value.value()),
            );
        }
    }

    rendered
}

fn label_oid(label: &str) -> ObjectIdentifier {
    match label {
        "OU" => rfc4519::OU,
        "O" => rfc4519::O,
        "L" => rfc4519::L,
        "ST" => rfc4519::ST,
        "C" => rfc4519::C,
        "E" => rfc3280::EMAIL_ADDRESS,
        _ => rfc4519::CN,
    }
}

fn oid_label(oid: &ObjectIdentifier) -> Option<&'static str> {
    SUBJECT_FIELD_LABELS
        .into_iter()
        .find(|label| label_oid(label) == *oid)
}

/// Escapes the characters RFC 4514 reserves inside attribute values.
fn push_escaped(rendered: &mut String, value: &str) {
    for c in value.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            rendered.push('\\');
        }
        rendered.push(c);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const FIELDS: [&str; 7] = [
        "host.example.com",
        "Eng",
        "Acme",
        "City",
        "State",
        "US",
        "a@b.com",
    ];

    #[test]
    fn distinguished_name_is_rendered_in_field_order() {
        let subject = SubjectIdentity::from_fields(&FIELDS).unwrap();
        assert_eq!(
            subject.distinguished_name(),
            "CN=host.example.com,OU=Eng,O=Acme,L=City,ST=State,C=US,E=a@b.com"
        );
    }

    #[test]
    fn name_renders_like_the_identity() {
        let subject = SubjectIdentity::from_fields(&FIELDS).unwrap();
        let name = subject.to_name().unwrap();

        assert_eq!(render_name(&name), subject.distinguished_name());
        // The most significant RDN is the email address.
        assert_eq!(name.0[0].0.get(0).unwrap().oid, rfc3280::EMAIL_ADDRESS);
        assert_eq!(name.0[6].0.get(0).unwrap().oid, rfc4519::CN);
    }

    #[rstest]
    #[case(vec![])]
    #[case(FIELDS[..6].to_vec())]
    #[case(vec!["a", "b", "c", "d", "e", "f", "g", "h"])]
    fn wrong_field_count(#[case] fields: Vec<&str>) {
        let error = SubjectIdentity::from_fields(&fields).unwrap_err();
        assert!(matches!(error, SubjectError::FieldCount { count } if count == fields.len()));
    }

    #[rstest]
    #[case(0, "CN")]
    #[case(3, "L")]
    #[case(6, "E")]
    fn empty_field(#[case] position: usize, #[case] expected: &str) {
        let mut fields = FIELDS;
        fields[position] = " ";

        let error = SubjectIdentity::from_fields(&fields).unwrap_err();
        assert!(matches!(error, SubjectError::EmptyField { label } if label == expected));
    }

    #[test]
    fn surrounding_whitespace_is_preserved() {
        let mut fields = FIELDS;
        fields[1] = " Eng";

        let identity = SubjectIdentity::from_fields(&fields).unwrap();
        assert_eq!(identity.organizational_unit, " Eng");
        assert_eq!(
            identity.distinguished_name(),
            "CN=host.example.com,OU= Eng,O=Acme,L=City,ST=State,C=US,E=a@b.com"
        );
        assert_eq!(
            render_name(&identity.to_name().unwrap()),
            identity.distinguished_name()
        );
    }

    #[rstest]
    #[case("../etc")]
    #[case("a/b")]
    #[case("..")]
    #[case("a\\b")]
    fn path_like_common_names_are_rejected(#[case] common_name: &str) {
        let mut fields = FIELDS;
        fields[0] = common_name;

        let error = SubjectIdentity::from_fields(&fields).unwrap_err();
        assert!(matches!(error, SubjectError::InvalidCommonName { .. }));
    }

    #[test]
    fn non_printable_country_cannot_be_encoded() {
        let mut fields = FIELDS;
        fields[5] = "U_S";

        let subject = SubjectIdentity::from_fields(&fields).unwrap();
        let error = subject.to_name().unwrap_err();
        assert!(matches!(error, SubjectError::EncodeField { label: "C", .. }));
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let mut fields = FIELDS;
        fields[2] = "Acme, Inc.";

        let subject = SubjectIdentity::from_fields(&fields).unwrap();
        assert!(subject.distinguished_name().contains("O=Acme\\, Inc."));
        assert_eq!(
            render_name(&subject.to_name().unwrap()),
            subject.distinguished_name()
        );
    }
}
