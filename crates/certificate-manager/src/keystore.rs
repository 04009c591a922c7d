//! A thin typed layer over [`p12_keystore`].
//!
//! The PKCS#12 container holds the trust anchors as trusted certificate
//! entries and at most one private key entry per subject. Certificates cross
//! this boundary as [`x509_cert::Certificate`], chains as [`TrustChain`].
use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu};
use tracing::debug;
use x509_cert::{
    Certificate,
    der::{Decode, Encode},
};
use zeroize::Zeroizing;

use crate::{chain::TrustChain, subject::render_name};

pub type Result<T, E = Error> = std::result::Result<T, E>;

const CHAIN_LENGTH: usize = 3;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the keystore integrity check failed, the password is most likely wrong"))]
    IncorrectPassword { source: p12_keystore::error::Error },

    #[snafu(display("failed to decode PKCS#12 keystore"))]
    DecodeKeystore { source: p12_keystore::error::Error },

    #[snafu(display("failed to encode PKCS#12 keystore"))]
    EncodeKeystore { source: p12_keystore::error::Error },

    #[snafu(display("failed to encode certificate {subject:?} as DER"))]
    EncodeCertificate {
        source: x509_cert::der::Error,
        subject: String,
    },

    #[snafu(display("failed to convert certificate {subject:?} into a keystore entry"))]
    ConvertCertificate {
        source: p12_keystore::error::Error,
        subject: String,
    },

    #[snafu(display("failed to decode certificate stored under alias {alias:?}"))]
    DecodeStoredCertificate {
        source: x509_cert::der::Error,
        alias: String,
    },

    #[snafu(display("the certificate chain stored under alias {alias:?} is incomplete"))]
    IncompleteChain {
        source: crate::chain::Error,
        alias: String,
    },
}

/// A PKCS#12 keystore, held in memory.
#[derive(Debug, Default)]
pub struct Keystore {
    inner: KeyStore,
}

impl Keystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a PKCS#12 keystore protected by `password`.
    ///
    /// A failed integrity check is reported as [`Error::IncorrectPassword`].
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self> {
        let inner = KeyStore::from_pkcs12(data, password).map_err(|error| match error {
            p12_keystore::error::Error::MacError(_) => Error::IncorrectPassword { source: error },
            _ => Error::DecodeKeystore { source: error },
        })?;

        debug!(
            keystore.entries = inner.entries_count(),
            "decoded PKCS#12 keystore"
        );
        Ok(Self { inner })
    }

    /// Encodes the keystore as PKCS#12, protected by `password`.
    pub fn to_pkcs12(&self, password: &str) -> Result<Vec<u8>> {
        self.inner
            .writer(password)
            .write()
            .context(EncodeKeystoreSnafu)
    }

    /// Adds `certificate` as a trusted entry, replacing any entry under `alias`.
    pub fn set_trusted_certificate(&mut self, alias: &str, certificate: &Certificate) -> Result<()> {
        let certificate = to_keystore_certificate(certificate)?;
        self.inner
            .add_entry(alias, KeyStoreEntry::Certificate(certificate));

        debug!(keystore.alias = alias, "stored trusted certificate");
        Ok(())
    }

    /// Returns the trusted certificate stored under `alias`, if any.
    pub fn trusted_certificate(&self, alias: &str) -> Result<Option<Certificate>> {
        match self.inner.entry(alias) {
            Some(KeyStoreEntry::Certificate(certificate)) => {
                from_keystore_certificate(alias, certificate).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Stores the DER-encoded PKCS#8 `private_key` under `alias` together with
    /// its chain of trust, replacing any previous entry.
    pub fn set_key_entry(
        &mut self,
        alias: &str,
        private_key: &[u8],
        chain: &TrustChain,
    ) -> Result<()> {
        let certificates = chain
            .leaf_first()
            .into_iter()
            .map(to_keystore_certificate)
            .collect::<Result<Vec<_>>>()?;

        for position in 1..CHAIN_LENGTH {
            self.inner.delete_entry(&chain_alias(alias, position));
        }

        // PKCS#12 readers rebuild a key's chain by following issuer names, so
        // a chain that doesn't link up (a self-signed leaf, for example) would
        // be cut short. Its upper certificates are kept as trusted entries.
        let linked = is_linked_by_issuer_names(chain);
        if !linked {
            for (position, certificate) in certificates.iter().enumerate().skip(1) {
                self.inner.add_entry(
                    &chain_alias(alias, position),
                    KeyStoreEntry::Certificate(certificate.clone()),
                );
            }
        }

        // Links the key to the leaf certificate (the first one of the chain).
        let local_key_id = Sha256::digest(certificates[0].as_der());
        let entry = PrivateKeyChain::new(private_key, local_key_id, certificates);

        self.inner
            .add_entry(alias, KeyStoreEntry::PrivateKeyChain(entry));

        debug!(
            keystore.alias = alias,
            keystore.chain_length = CHAIN_LENGTH,
            keystore.chain_linked = linked,
            "stored private key entry"
        );
        Ok(())
    }

    /// Returns `true` if a private key entry exists under `alias`.
    pub fn contains_key_entry(&self, alias: &str) -> bool {
        matches!(
            self.inner.entry(alias),
            Some(KeyStoreEntry::PrivateKeyChain(_))
        )
    }

    /// Returns the DER-encoded PKCS#8 private key stored under `alias`.
    pub fn private_key(&self, alias: &str) -> Option<Zeroizing<Vec<u8>>> {
        match self.inner.entry(alias) {
            Some(KeyStoreEntry::PrivateKeyChain(entry)) => {
                Some(Zeroizing::new(entry.key().to_vec()))
            }
            _ => None,
        }
    }

    /// Returns the chain of trust of the private key stored under `alias`.
    pub fn certificate_chain(&self, alias: &str) -> Result<Option<TrustChain>> {
        let Some(KeyStoreEntry::PrivateKeyChain(entry)) = self.inner.entry(alias) else {
            return Ok(None);
        };

        let mut leaf_first = entry.chain().iter().collect::<Vec<_>>();
        let upper = (1..CHAIN_LENGTH)
            .map_while(|position| match self.inner.entry(&chain_alias(alias, position)) {
                Some(KeyStoreEntry::Certificate(certificate)) => Some(certificate),
                _ => None,
            })
            .collect::<Vec<_>>();
        if !upper.is_empty() {
            leaf_first.truncate(1);
            leaf_first.extend(upper);
        }

        let root_first = leaf_first
            .into_iter()
            .rev()
            .map(|certificate| from_keystore_certificate(alias, certificate))
            .collect::<Result<Vec<_>>>()?;

        TrustChain::from_root_first(root_first)
            .context(IncompleteChainSnafu { alias })
            .map(Some)
    }

    /// The number of entries, trusted certificates and private keys alike.
    pub fn len(&self) -> usize {
        self.inner.entries_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The alias of the chain certificate at `position` (leaf first) of the key
/// entry `alias`, if it has to be stored on its own.
fn chain_alias(alias: &str, position: usize) -> String {
    format!("{alias}.chain.{position}")
}

/// Returns `true` if every certificate of `chain` names the next one as its
/// issuer and the root is self-issued, so the chain survives a round trip.
fn is_linked_by_issuer_names(chain: &TrustChain) -> bool {
    let [root, intermediate, leaf] = chain.root_first().map(|c| &c.tbs_certificate);

    chain.validate_linkage().is_ok()
        && root.issuer == root.subject
        && intermediate.subject != root.subject
        && leaf.subject != intermediate.subject
        && leaf.subject != root.subject
}

fn to_keystore_certificate(certificate: &Certificate) -> Result<p12_keystore::Certificate> {
    let subject = || render_name(&certificate.tbs_certificate.subject);

    let der = certificate
        .to_der()
        .with_context(|_| EncodeCertificateSnafu { subject: subject() })?;

    p12_keystore::Certificate::from_der(&der)
        .with_context(|_| ConvertCertificateSnafu { subject: subject() })
}

fn from_keystore_certificate(
    alias: &str,
    certificate: &p12_keystore::Certificate,
) -> Result<Certificate> {
    Certificate::from_der(certificate.as_der()).context(DecodeStoredCertificateSnafu { alias })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        keys::{CertificateKeypair, ecdsa},
        test_utils::TestCertificateAuthority,
    };

    const PASSWORD: &str = "changeit";

    #[test]
    fn trusted_certificates_round_trip() {
        let ca = TestCertificateAuthority::new();

        let mut keystore = Keystore::new();
        keystore.set_trusted_certificate("root", &ca.root).unwrap();
        keystore
            .set_trusted_certificate("intermediate", &ca.intermediate)
            .unwrap();

        let data = keystore.to_pkcs12(PASSWORD).unwrap();
        let reopened = Keystore::from_pkcs12(&data, PASSWORD).unwrap();

        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.trusted_certificate("root").unwrap(), Some(ca.root));
        assert_eq!(
            reopened.trusted_certificate("intermediate").unwrap(),
            Some(ca.intermediate)
        );
        assert!(!reopened.contains_key_entry("root"));
        assert_eq!(reopened.certificate_chain("root").unwrap(), None);
    }

    #[test]
    fn key_entry_round_trips_root_first() {
        let ca = TestCertificateAuthority::new();
        let key = ecdsa::SigningKey::new(ecdsa::KEY_SIZE).unwrap();
        let leaf = ca.issue_leaf_for_key(
            "CN=subject.local",
            key.subject_public_key_info().unwrap(),
        );
        let chain = TrustChain::new(ca.root.clone(), ca.intermediate.clone(), leaf);
        let private_key = key.to_private_key_der().unwrap();

        let mut keystore = Keystore::new();
        keystore.set_trusted_certificate("root", &ca.root).unwrap();
        keystore
            .set_key_entry("subject.local", &private_key, &chain)
            .unwrap();

        let data = keystore.to_pkcs12(PASSWORD).unwrap();
        let reopened = Keystore::from_pkcs12(&data, PASSWORD).unwrap();

        assert!(reopened.contains_key_entry("subject.local"));
        assert_eq!(
            reopened.private_key("subject.local").as_deref(),
            Some(&*private_key)
        );
        assert_eq!(
            reopened.certificate_chain("subject.local").unwrap(),
            Some(chain)
        );
    }

    #[test]
    fn self_signed_leaf_keeps_the_whole_chain() {
        let ca = TestCertificateAuthority::new();
        let leaf = ca.issue_self_signed("CN=subject.local");
        let chain = TrustChain::new(ca.root.clone(), ca.intermediate.clone(), leaf);
        let private_key = ecdsa::SigningKey::new(ecdsa::KEY_SIZE)
            .unwrap()
            .to_private_key_der()
            .unwrap();

        let mut keystore = Keystore::new();
        keystore
            .set_key_entry("subject.local", &private_key, &chain)
            .unwrap();

        let data = keystore.to_pkcs12(PASSWORD).unwrap();
        let reopened = Keystore::from_pkcs12(&data, PASSWORD).unwrap();

        let restored = reopened.certificate_chain("subject.local").unwrap().unwrap();
        assert_eq!(restored, chain);
        assert_eq!(restored.root_first()[0], &ca.root);
    }

    #[test]
    fn replaced_key_entry_drops_stale_chain_certificates() {
        let ca = TestCertificateAuthority::new();
        let key = ecdsa::SigningKey::new(ecdsa::KEY_SIZE).unwrap();
        let private_key = key.to_private_key_der().unwrap();
        let self_signed = TrustChain::new(
            ca.root.clone(),
            ca.intermediate.clone(),
            ca.issue_self_signed("CN=subject.local"),
        );
        let issued = TrustChain::new(
            ca.root.clone(),
            ca.intermediate.clone(),
            ca.issue_leaf_for_key("CN=subject.local", key.subject_public_key_info().unwrap()),
        );

        let mut keystore = Keystore::new();
        keystore
            .set_key_entry("subject.local", &private_key, &self_signed)
            .unwrap();
        assert_eq!(keystore.len(), 3);

        keystore
            .set_key_entry("subject.local", &private_key, &issued)
            .unwrap();
        assert_eq!(keystore.len(), 1);

        let data = keystore.to_pkcs12(PASSWORD).unwrap();
        let reopened = Keystore::from_pkcs12(&data, PASSWORD).unwrap();
        assert_eq!(
            reopened.certificate_chain("subject.local").unwrap(),
            Some(issued)
        );
    }

    #[test]
    fn wrong_password_is_detected() {
        let ca = TestCertificateAuthority::new();
        let mut keystore = Keystore::new();
        keystore.set_trusted_certificate("root", &ca.root).unwrap();
        let data = keystore.to_pkcs12(PASSWORD).unwrap();

        let error = Keystore::from_pkcs12(&data, "wrong").unwrap_err();
        assert!(matches!(error, Error::IncorrectPassword { .. }));
    }

    #[test]
    fn garbage_is_not_a_keystore() {
        let error = Keystore::from_pkcs12(b"definitely not PKCS#12", PASSWORD).unwrap_err();
        assert!(matches!(error, Error::DecodeKeystore { .. }));
    }
}
