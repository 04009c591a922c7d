//! Fixtures shared by the unit tests: a two-level certificate authority and a
//! scratch directory tree laid out like a production installation.
use std::{fs, path::PathBuf, time::Duration};

use tempfile::TempDir;
use x509_cert::{
    Certificate,
    builder::{Builder, CertificateBuilder, Profile},
    der::{Encode, EncodePem},
    name::Name,
    request::CertReq,
    serial_number::SerialNumber,
    spki::{EncodePublicKey, SubjectPublicKeyInfoOwned},
    time::Validity,
};

use crate::{
    CertificateManager,
    config::CertificateConfig,
    consts::PEM_LINE_ENDING,
    keys::{CertificateKeypair, ecdsa},
};

const ROOT_SUBJECT: &str = "CN=Test Root CA,O=Certificate Manager";
const INTERMEDIATE_SUBJECT: &str = "CN=Test Intermediate CA,O=Certificate Manager";

const CERTIFICATE_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// A root CA and an intermediate CA signed by it. All keys are P-256, which
/// keeps the tests fast regardless of the subject key algorithm.
pub(crate) struct TestCertificateAuthority {
    pub root: Certificate,
    pub intermediate: Certificate,
    intermediate_key: ecdsa::SigningKey,
}

impl TestCertificateAuthority {
    pub fn new() -> Self {
        let root_key = new_key();
        let root_name: Name = ROOT_SUBJECT.parse().expect("valid root subject");
        let root = build_certificate(
            Profile::Root,
            root_name.clone(),
            root_key.subject_public_key_info().unwrap(),
            &root_key,
        );

        let intermediate_key = new_key();
        let intermediate = build_certificate(
            Profile::SubCA {
                issuer: root_name,
                path_len_constraint: Some(0),
            },
            INTERMEDIATE_SUBJECT.parse().expect("valid intermediate subject"),
            intermediate_key.subject_public_key_info().unwrap(),
            &root_key,
        );

        Self {
            root,
            intermediate,
            intermediate_key,
        }
    }

    /// Issues a leaf certificate for the subject and public key of `request`,
    /// the way the CA would process a CSR.
    pub fn issue_for_request(&self, request: &CertReq) -> Certificate {
        self.issue_leaf_with_name(
            request.info.subject.clone(),
            request.info.public_key.clone(),
        )
    }

    /// Issues a leaf certificate for `subject` and a throwaway key.
    pub fn issue_leaf(&self, subject: &str) -> Certificate {
        let key = new_key();
        self.issue_leaf_for_key(subject, key.subject_public_key_info().unwrap())
    }

    pub fn issue_leaf_for_key(
        &self,
        subject: &str,
        public_key: SubjectPublicKeyInfoOwned,
    ) -> Certificate {
        self.issue_leaf_with_name(subject.parse().expect("valid leaf subject"), public_key)
    }

    /// Issues a self-signed certificate, which is not part of this CA.
    pub fn issue_self_signed(&self, subject: &str) -> Certificate {
        let key = new_key();
        build_certificate(
            Profile::Root,
            subject.parse().expect("valid subject"),
            key.subject_public_key_info().unwrap(),
            &key,
        )
    }

    fn issue_leaf_with_name(
        &self,
        subject: Name,
        public_key: SubjectPublicKeyInfoOwned,
    ) -> Certificate {
        build_certificate(
            Profile::Leaf {
                issuer: self.intermediate.tbs_certificate.subject.clone(),
                enable_key_agreement: false,
                enable_key_encipherment: true,
            },
            subject,
            public_key,
            &self.intermediate_key,
        )
    }
}

fn new_key() -> ecdsa::SigningKey {
    ecdsa::SigningKey::new(ecdsa::KEY_SIZE).expect("failed to create P-256 key")
}

/// Signs a certificate for the subject and public key of `request` with the
/// subject's own `key`, as an operator would do without a CA at hand.
pub(crate) fn self_sign_request<KP>(request: &CertReq, key: &KP) -> Certificate
where
    KP: CertificateKeypair,
    <KP::SigningKey as signature::Keypair>::VerifyingKey: EncodePublicKey,
{
    build_certificate(
        Profile::Root,
        request.info.subject.clone(),
        request.info.public_key.clone(),
        key,
    )
}

fn build_certificate<KP>(
    profile: Profile,
    subject: Name,
    public_key: SubjectPublicKeyInfoOwned,
    signer: &KP,
) -> Certificate
where
    KP: CertificateKeypair,
    <KP::SigningKey as signature::Keypair>::VerifyingKey: EncodePublicKey,
{
    let serial_number = SerialNumber::from(rand::random::<u64>());
    let validity = Validity::from_now(CERTIFICATE_VALIDITY).expect("valid validity");

    CertificateBuilder::new(
        profile,
        serial_number,
        validity,
        subject,
        public_key,
        signer.signing_key(),
    )
    .expect("failed to create certificate builder")
    .build::<KP::Signature>()
    .expect("failed to build certificate")
}

/// A scratch installation: root directory with the default subdirectories,
/// the CA certificates on disk and a matching configuration.
pub(crate) struct TestEnvironment {
    pub dir: TempDir,
    pub ca: TestCertificateAuthority,
    pub config: CertificateConfig,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temporary directory");
        let ca = TestCertificateAuthority::new();

        let anchors = dir.path().join("anchors");
        fs::create_dir(&anchors).unwrap();

        // One anchor as PEM, one as DER, both must be accepted.
        let root_certificate_file = anchors.join("root.pem");
        let intermediate_certificate_file = anchors.join("intermediate.der");
        fs::write(&root_certificate_file, ca.root.to_pem(PEM_LINE_ENDING).unwrap()).unwrap();
        fs::write(&intermediate_certificate_file, ca.intermediate.to_der().unwrap()).unwrap();

        let config = CertificateConfig::builder()
            .root_directory(dir.path())
            .root_certificate_file(root_certificate_file)
            .intermediate_certificate_file(intermediate_certificate_file)
            .build();

        for base in [
            config.private_key_base_directory(),
            config.public_key_base_directory(),
            config.csr_base_directory(),
            config.keystore_base_directory(),
        ] {
            fs::create_dir(base).unwrap();
        }

        Self { dir, ca, config }
    }

    /// Creates the four per-subject directories for `common_name`.
    pub fn create_subject_directories(&self, common_name: &str) {
        for directory in self.subject_directories(common_name) {
            fs::create_dir_all(directory).unwrap();
        }
    }

    pub fn subject_directories(&self, common_name: &str) -> [PathBuf; 4] {
        [
            self.config.private_key_base_directory().join(common_name),
            self.config.public_key_base_directory().join(common_name),
            self.config.csr_base_directory().join(common_name),
            self.config.keystore_base_directory().join(common_name),
        ]
    }

    pub fn manager(&self) -> CertificateManager {
        CertificateManager::new(self.config.clone()).expect("valid test configuration")
    }
}
