//! Loading of X.509 certificates and the `[root, intermediate, leaf]` chain of
//! trust stored alongside a subject's private key.
use std::{fs, path::Path};

use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;
use x509_cert::{
    Certificate,
    der::{Decode, DecodePem},
};

use crate::{
    error::{ParseCertificateSnafu, ReadCertificateSnafu, Result},
    subject::render_name,
};

const PEM_PREFIX: &[u8] = b"-----BEGIN";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "the intermediate certificate was issued by {issuer:?}, not by the root {root:?}"
    ))]
    IntermediateNotIssuedByRoot { issuer: String, root: String },

    #[snafu(display(
        "the leaf certificate was issued by {issuer:?}, not by the intermediate {intermediate:?}"
    ))]
    LeafNotIssuedByIntermediate {
        issuer: String,
        intermediate: String,
    },

    #[snafu(display("expected a chain of 3 certificates, got {length}"))]
    ChainLength { length: usize },
}

/// Reads a single X.509 certificate, encoded either as PEM or as DER.
pub fn load_certificate(path: &Path) -> Result<Certificate> {
    let bytes = fs::read(path).context(ReadCertificateSnafu { path })?;

    let certificate = if bytes.trim_ascii_start().starts_with(PEM_PREFIX) {
        Certificate::from_pem(&bytes)
    } else {
        Certificate::from_der(&bytes)
    }
    .context(ParseCertificateSnafu { path })?;

    debug!(
        certificate.path = %path.display(),
        certificate.subject = %render_name(&certificate.tbs_certificate.subject),
        certificate.serial = %certificate.tbs_certificate.serial_number,
        "loaded certificate"
    );

    Ok(certificate)
}

/// The chain of trust of an issued certificate, ordered root first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustChain {
    root: Certificate,
    intermediate: Certificate,
    leaf: Certificate,
}

impl TrustChain {
    pub fn new(root: Certificate, intermediate: Certificate, leaf: Certificate) -> Self {
        Self {
            root,
            intermediate,
            leaf,
        }
    }

    /// Builds the chain from certificates ordered root first.
    pub fn from_root_first(certificates: Vec<Certificate>) -> Result<Self, Error> {
        let length = certificates.len();
        let Ok([root, intermediate, leaf]) = <[Certificate; 3]>::try_from(certificates) else {
            return ChainLengthSnafu { length }.fail();
        };

        Ok(Self::new(root, intermediate, leaf))
    }

    pub fn root(&self) -> &Certificate {
        &self.root
    }

    pub fn intermediate(&self) -> &Certificate {
        &self.intermediate
    }

    pub fn leaf(&self) -> &Certificate {
        &self.leaf
    }

    /// Returns `[root, intermediate, leaf]`.
    pub fn root_first(&self) -> [&Certificate; 3] {
        [&self.root, &self.intermediate, &self.leaf]
    }

    /// Returns `[leaf, intermediate, root]`, the order PKCS#12 stores chains in.
    pub fn leaf_first(&self) -> [&Certificate; 3] {
        [&self.leaf, &self.intermediate, &self.root]
    }

    /// Checks the issuer of every certificate against the subject of the
    /// certificate above it.
    pub fn validate_linkage(&self) -> Result<(), Error> {
        let root = &self.root.tbs_certificate;
        let intermediate = &self.intermediate.tbs_certificate;
        let leaf = &self.leaf.tbs_certificate;

        ensure!(
            intermediate.issuer == root.subject,
            IntermediateNotIssuedByRootSnafu {
                issuer: render_name(&intermediate.issuer),
                root: render_name(&root.subject),
            }
        );
        ensure!(
            leaf.issuer == intermediate.subject,
            LeafNotIssuedByIntermediateSnafu {
                issuer: render_name(&leaf.issuer),
                intermediate: render_name(&intermediate.subject),
            }
        );

        Ok(())
    }
}
