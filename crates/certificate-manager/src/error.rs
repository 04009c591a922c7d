use std::path::PathBuf;

use snafu::Snafu;

use crate::{chain, config, keys, keystore, subject::SubjectError};

pub type Result<T, E = CertificateManagementError> = std::result::Result<T, E>;

/// The error returned by every operation of the
/// [`CertificateManager`](crate::CertificateManager).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CertificateManagementError {
    #[snafu(display("invalid certificate configuration"))]
    InvalidConfiguration { source: config::Error },

    #[snafu(display("invalid certificate subject"))]
    InvalidSubject { source: SubjectError },

    #[snafu(display("the keystore password must not be empty"))]
    EmptyStorePassword,

    #[snafu(display("the certificate validity must be at least one day"))]
    InvalidValidity,

    #[snafu(display("the key size must be a positive number of bits"))]
    InvalidKeySize,

    #[snafu(display("the {kind} directory {path:?} of the subject does not exist"))]
    MissingSubjectDirectory { kind: &'static str, path: PathBuf },

    #[snafu(display("refusing to overwrite existing file {path:?}"))]
    FileAlreadyExists { path: PathBuf },

    #[snafu(display("failed to create file {path:?}"))]
    CreateFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write file {path:?}"))]
    WriteFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to generate RSA key pair"))]
    GenerateRsaKey { source: keys::rsa::Error },

    #[snafu(display("failed to generate EC key pair"))]
    GenerateEcdsaKey { source: keys::ecdsa::Error },

    #[snafu(display("failed to decode RSA private key of {path:?}"))]
    DecodeRsaPrivateKey {
        source: keys::rsa::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to decode EC private key of {path:?}"))]
    DecodeEcdsaPrivateKey {
        source: keys::ecdsa::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to serialize private key as PKCS8"))]
    SerializePrivateKey { source: p256::pkcs8::Error },

    #[snafu(display("failed to serialize public key"))]
    SerializePublicKey { source: x509_cert::spki::Error },

    #[snafu(display("failed to decode PEM file {path:?}"))]
    DecodePem {
        source: x509_cert::der::Error,
        path: PathBuf,
    },

    #[snafu(display("expected a PEM encoded {expected:?} in {path:?}, found {found:?}"))]
    UnexpectedPemLabel {
        expected: &'static str,
        found: String,
        path: PathBuf,
    },

    #[snafu(display("failed to create certificate signing request builder"))]
    CreateRequestBuilder { source: x509_cert::builder::Error },

    #[snafu(display("failed to sign certificate signing request"))]
    SignRequest { source: x509_cert::builder::Error },

    #[snafu(display("failed to encode certificate signing request as PEM"))]
    EncodeRequest { source: x509_cert::der::Error },

    #[snafu(display("failed to read certificate {path:?}"))]
    ReadCertificate {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse X.509 certificate {path:?}"))]
    ParseCertificate {
        source: x509_cert::der::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to load keystore {path:?}"))]
    LoadKeystore {
        source: keystore::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to update keystore"))]
    UpdateKeystore { source: keystore::Error },

    #[snafu(display("failed to encode keystore {path:?}"))]
    StoreKeystore {
        source: keystore::Error,
        path: PathBuf,
    },

    #[snafu(display(
        "the private key in keystore {path:?} can not be recovered, the store password is wrong or the keystore is corrupted"
    ))]
    UnrecoverableKey {
        source: keystore::Error,
        path: PathBuf,
    },

    #[snafu(display(
        "neither keystore {keystore:?} nor {private_key:?} contain a private key for {alias:?}"
    ))]
    MissingKeyEntry {
        alias: String,
        keystore: PathBuf,
        private_key: PathBuf,
    },

    #[snafu(display("the root directory {path:?} does not exist or is not writable"))]
    RootDirectoryUnavailable { path: PathBuf },

    #[snafu(display("the root CA certificate {path:?} does not exist"))]
    RootCertificateMissing { path: PathBuf },

    #[snafu(display("the intermediate CA certificate {path:?} does not exist"))]
    IntermediateCertificateMissing { path: PathBuf },

    #[snafu(display("the keystore directory {path:?} does not exist or is not writable"))]
    KeystoreDirectoryUnavailable { path: PathBuf },

    #[snafu(display("the keystore {path:?} does not exist or is not writable"))]
    KeystoreFileUnavailable { path: PathBuf },

    #[snafu(display("the signed certificate does not chain up to the configured trust anchors"))]
    InvalidChain { source: chain::Error },

    #[snafu(display(
        "the signed certificate for {common_name:?} does not belong to the private key of the request"
    ))]
    KeyCertificateMismatch { common_name: String },
}

impl CertificateManagementError {
    /// Returns `true` if the keystore could not be opened with the given
    /// password, so the private key it protects can't be recovered.
    pub fn is_unrecoverable_key(&self) -> bool {
        matches!(self, Self::UnrecoverableKey { .. })
    }

    /// Returns `true` if the operation refused to overwrite an existing file.
    pub fn is_file_exists(&self) -> bool {
        matches!(self, Self::FileAlreadyExists { .. })
    }
}
