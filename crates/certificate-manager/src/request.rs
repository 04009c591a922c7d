//! Creation of a subject's key pair, certificate signing request and
//! anchor-only keystore.
use std::path::PathBuf;

use snafu::ResultExt;
use tracing::{debug, info};
use x509_cert::{
    builder::{Builder, RequestBuilder},
    der::EncodePem,
    spki::EncodePublicKey,
};

use crate::{
    chain::load_certificate,
    config::{CertificateConfig, KeyAlgorithm},
    consts::PEM_LINE_ENDING,
    error::{
        CreateRequestBuilderSnafu, EncodeRequestSnafu, GenerateEcdsaKeySnafu,
        GenerateRsaKeySnafu, InvalidSubjectSnafu, Result, SerializePrivateKeySnafu,
        SerializePublicKeySnafu, SignRequestSnafu, StoreKeystoreSnafu, UpdateKeystoreSnafu,
    },
    files::CreatedFiles,
    keys::{CertificateKeypair, ecdsa, rsa},
    keystore::Keystore,
    paths::SubjectPaths,
    subject::{SubjectIdentity, render_name},
};

/// The files written for a subject by
/// [`CertificateManager::create_certificate_request`](crate::CertificateManager::create_certificate_request).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRequestFiles {
    pub subject: SubjectIdentity,

    /// PEM-encoded PKCS#8 private key.
    pub private_key: PathBuf,

    /// PEM-encoded SubjectPublicKeyInfo.
    pub public_key: PathBuf,

    /// PEM-encoded PKCS#10 certificate signing request, the file to hand to
    /// the certificate authority.
    pub csr: PathBuf,

    /// PKCS#12 keystore holding the trust anchors.
    pub keystore: PathBuf,

    /// The requested validity. It is not part of the request itself.
    pub validity_days: u32,
}

pub(crate) fn create_certificate_request(
    config: &CertificateConfig,
    subject: SubjectIdentity,
    store_password: &str,
    validity_days: u32,
    key_size: usize,
) -> Result<CertificateRequestFiles> {
    let paths = SubjectPaths::resolve(config, &subject.common_name);
    paths.ensure_directories_exist()?;

    let request = SubjectRequest {
        config,
        paths,
        subject,
        store_password,
        validity_days,
    };

    match config.key_algorithm {
        KeyAlgorithm::Rsa => {
            let key_pair = rsa::SigningKey::new(key_size).context(GenerateRsaKeySnafu)?;
            request.write(&key_pair)
        }
        KeyAlgorithm::Ec => {
            let key_pair = ecdsa::SigningKey::new(key_size).context(GenerateEcdsaKeySnafu)?;
            request.write(&key_pair)
        }
    }
}

struct SubjectRequest<'a> {
    config: &'a CertificateConfig,
    paths: SubjectPaths,
    subject: SubjectIdentity,
    store_password: &'a str,
    validity_days: u32,
}

impl SubjectRequest<'_> {
    fn write<KP>(self, key_pair: &KP) -> Result<CertificateRequestFiles>
    where
        KP: CertificateKeypair,
        <KP::SigningKey as signature::Keypair>::VerifyingKey: EncodePublicKey,
    {
        let name = self.subject.to_name().context(InvalidSubjectSnafu)?;

        debug!(
            csr.subject = %render_name(&name),
            csr.public_key.algorithm = KP::algorithm_name(),
            csr.public_key.size = key_pair.key_size(),
            csr.signature_algorithm = %self.config.signature_algorithm,
            "building certificate signing request"
        );
        let csr = RequestBuilder::new(name, key_pair.signing_key())
            .context(CreateRequestBuilderSnafu)?
            .build::<KP::Signature>()
            .context(SignRequestSnafu)?;
        let csr_pem = csr.to_pem(PEM_LINE_ENDING).context(EncodeRequestSnafu)?;

        let root = load_certificate(&self.config.root_certificate_file)?;
        let intermediate = load_certificate(&self.config.intermediate_certificate_file)?;

        let mut keystore = Keystore::new();
        keystore
            .set_trusted_certificate(&self.config.root_certificate_alias, &root)
            .context(UpdateKeystoreSnafu)?;
        keystore
            .set_trusted_certificate(&self.config.intermediate_certificate_alias, &intermediate)
            .context(UpdateKeystoreSnafu)?;
        let keystore_bytes = keystore
            .to_pkcs12(self.store_password)
            .context(StoreKeystoreSnafu {
                path: &self.paths.keystore.file,
            })?;

        let private_key_pem = key_pair
            .to_private_key_pem(PEM_LINE_ENDING)
            .context(SerializePrivateKeySnafu)?;
        let public_key_pem = key_pair
            .to_public_key_pem(PEM_LINE_ENDING)
            .context(SerializePublicKeySnafu)?;

        let mut created = CreatedFiles::default();
        created.create_new(&self.paths.private_key.file, private_key_pem.as_bytes())?;
        created.create_new(&self.paths.public_key.file, public_key_pem.as_bytes())?;
        created.create_new(&self.paths.csr.file, csr_pem.as_bytes())?;
        created.create_new(&self.paths.keystore.file, &keystore_bytes)?;
        created.commit();

        info!(
            certificate.subject = %self.subject.distinguished_name(),
            certificate.validity_days = self.validity_days,
            csr.path = %self.paths.csr.file.display(),
            "created certificate signing request"
        );

        Ok(CertificateRequestFiles {
            subject: self.subject,
            private_key: self.paths.private_key.file,
            public_key: self.paths.public_key.file,
            csr: self.paths.csr.file,
            keystore: self.paths.keystore.file,
            validity_days: self.validity_days,
        })
    }
}
