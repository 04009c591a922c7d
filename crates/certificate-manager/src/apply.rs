//! Installation of a CA-issued certificate into the subject's keystore.
use std::{fs, path::Path};

use p256::pkcs8::SecretDocument;
use snafu::{IntoError, ResultExt, ensure};
use tracing::{debug, info};
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::Zeroizing;

use crate::{
    chain::{TrustChain, load_certificate},
    config::{CertificateConfig, KeyAlgorithm},
    error::{
        DecodeEcdsaPrivateKeySnafu, DecodePemSnafu, DecodeRsaPrivateKeySnafu,
        IntermediateCertificateMissingSnafu, InvalidChainSnafu, KeyCertificateMismatchSnafu,
        KeystoreDirectoryUnavailableSnafu, KeystoreFileUnavailableSnafu, LoadKeystoreSnafu,
        MissingKeyEntrySnafu, ReadFileSnafu, Result, RootCertificateMissingSnafu,
        RootDirectoryUnavailableSnafu, SerializePublicKeySnafu, StoreKeystoreSnafu,
        UnexpectedPemLabelSnafu, UnrecoverableKeySnafu, UpdateKeystoreSnafu,
    },
    files::{is_writable, replace_atomically},
    keys::{CertificateKeypair, ecdsa, rsa},
    keystore::{self, Keystore},
    paths::SubjectPaths,
    subject::render_name,
};

const PRIVATE_KEY_PEM_LABEL: &str = "PRIVATE KEY";

pub(crate) fn apply_certificate_request(
    config: &CertificateConfig,
    common_name: &str,
    signed_certificate_file: &Path,
    keystore_file: &Path,
    store_password: &str,
) -> Result<bool> {
    check_preconditions(config, keystore_file)?;

    let mut keystore = open_keystore(keystore_file, store_password)?;

    let paths = SubjectPaths::resolve(config, common_name);
    let private_key = match keystore.private_key(common_name) {
        Some(private_key) => {
            debug!(keystore.alias = common_name, "found existing private key entry");
            private_key
        }
        None => read_private_key_file(&paths.private_key.file, keystore_file, common_name)?,
    };

    let root = load_certificate(&config.root_certificate_file)?;
    let intermediate = load_certificate(&config.intermediate_certificate_file)?;
    let leaf = load_certificate(signed_certificate_file)?;

    let chain = TrustChain::new(root, intermediate, leaf);
    if config.verify_chain {
        verify_chain(
            &chain,
            config.key_algorithm,
            &private_key,
            &paths.private_key.file,
            common_name,
        )?;
    }

    keystore
        .set_key_entry(common_name, &private_key, &chain)
        .context(UpdateKeystoreSnafu)?;
    let updated = keystore
        .to_pkcs12(store_password)
        .context(StoreKeystoreSnafu {
            path: keystore_file,
        })?;
    replace_atomically(keystore_file, &updated)?;

    info!(
        certificate.subject = %render_name(&chain.leaf().tbs_certificate.subject),
        certificate.serial = %chain.leaf().tbs_certificate.serial_number,
        certificate.not_after = %chain.leaf().tbs_certificate.validity.not_after,
        keystore.path = %keystore_file.display(),
        "installed signed certificate"
    );

    Ok(true)
}

/// Reads and decodes the keystore at `path`.
///
/// A failed integrity check means the password is wrong and is reported as
/// [`UnrecoverableKey`](crate::CertificateManagementError::UnrecoverableKey).
pub(crate) fn open_keystore(path: &Path, store_password: &str) -> Result<Keystore> {
    let data = fs::read(path).context(ReadFileSnafu { path })?;

    Keystore::from_pkcs12(&data, store_password).map_err(|error| match error {
        keystore::Error::IncorrectPassword { .. } => {
            UnrecoverableKeySnafu { path }.into_error(error)
        }
        _ => LoadKeystoreSnafu { path }.into_error(error),
    })
}

/// Checks everything on disk the applier needs before the keystore is opened.
fn check_preconditions(config: &CertificateConfig, keystore_file: &Path) -> Result<()> {
    let root_directory = &config.root_directory;
    ensure!(
        root_directory.is_dir() && is_writable(root_directory),
        RootDirectoryUnavailableSnafu {
            path: root_directory
        }
    );

    ensure!(
        config.root_certificate_file.is_file(),
        RootCertificateMissingSnafu {
            path: &config.root_certificate_file
        }
    );
    ensure!(
        config.intermediate_certificate_file.is_file(),
        IntermediateCertificateMissingSnafu {
            path: &config.intermediate_certificate_file
        }
    );

    let keystore_directory = keystore_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure!(
        keystore_directory.is_dir() && is_writable(keystore_directory),
        KeystoreDirectoryUnavailableSnafu {
            path: keystore_directory
        }
    );
    ensure!(
        keystore_file.is_file() && is_writable(keystore_file),
        KeystoreFileUnavailableSnafu {
            path: keystore_file
        }
    );

    Ok(())
}

/// Reads the PEM-encoded PKCS#8 private key written by the request builder.
fn read_private_key_file(
    path: &Path,
    keystore_file: &Path,
    common_name: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    ensure!(
        path.is_file(),
        MissingKeyEntrySnafu {
            alias: common_name,
            keystore: keystore_file,
            private_key: path,
        }
    );

    let pem = Zeroizing::new(fs::read_to_string(path).context(ReadFileSnafu { path })?);
    let (label, document) = SecretDocument::from_pem(&pem).context(DecodePemSnafu { path })?;
    ensure!(
        label == PRIVATE_KEY_PEM_LABEL,
        UnexpectedPemLabelSnafu {
            expected: PRIVATE_KEY_PEM_LABEL,
            found: label,
            path,
        }
    );

    debug!(private_key.path = %path.display(), "recovered private key from file");
    Ok(Zeroizing::new(document.as_bytes().to_vec()))
}

/// Checks that the chain links up to the root and that its leaf certifies
/// the subject's private key.
fn verify_chain(
    chain: &TrustChain,
    key_algorithm: KeyAlgorithm,
    private_key: &[u8],
    private_key_file: &Path,
    common_name: &str,
) -> Result<()> {
    chain.validate_linkage().context(InvalidChainSnafu)?;

    let private_public_key = public_key_of(key_algorithm, private_key, private_key_file)?;
    let leaf_public_key = &chain.leaf().tbs_certificate.subject_public_key_info;
    ensure!(
        private_public_key.subject_public_key == leaf_public_key.subject_public_key,
        KeyCertificateMismatchSnafu { common_name }
    );

    debug!(certificate.common_name = common_name, "verified chain of trust");
    Ok(())
}

/// Derives the public key of a DER-encoded PKCS#8 private key.
fn public_key_of(
    algorithm: KeyAlgorithm,
    private_key: &[u8],
    path: &Path,
) -> Result<SubjectPublicKeyInfoOwned> {
    let public_key = match algorithm {
        KeyAlgorithm::Rsa => rsa::SigningKey::from_pkcs8_der(private_key)
            .context(DecodeRsaPrivateKeySnafu { path })?
            .subject_public_key_info(),
        KeyAlgorithm::Ec => ecdsa::SigningKey::from_pkcs8_der(private_key)
            .context(DecodeEcdsaPrivateKeySnafu { path })?
            .subject_public_key_info(),
    };

    public_key.context(SerializePublicKeySnafu)
}
