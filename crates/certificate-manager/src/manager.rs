//! The entry point of the crate: [`CertificateManager`] runs the two
//! lifecycle operations of a subject against one [`CertificateConfig`].
//!
//! ```text
//! NoRequest --create_certificate_request--> Requested --apply_certificate_request--> Issued
//! ```
use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use snafu::{ResultExt, ensure};
use strum::Display;
use tracing::{debug, instrument};

use crate::{
    apply::{apply_certificate_request, open_keystore},
    config::CertificateConfig,
    error::{
        EmptyStorePasswordSnafu, InvalidConfigurationSnafu, InvalidKeySizeSnafu,
        InvalidSubjectSnafu, InvalidValiditySnafu, Result,
    },
    paths::SubjectPaths,
    request::{CertificateRequestFiles, create_certificate_request},
    subject::{SubjectIdentity, validate_common_name},
};

/// Where a subject is in its certificate lifecycle.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SubjectState {
    /// No keystore exists for the subject.
    NoRequest,

    /// A request was built, the keystore holds the trust anchors only.
    Requested,

    /// A signed certificate and the private key are stored in the keystore.
    Issued,
}

/// Builds certificate signing requests and installs the signed certificates.
///
/// Both operations are blocking and serialized per instance, so one manager
/// can be shared between threads.
#[derive(Debug)]
pub struct CertificateManager {
    config: CertificateConfig,
    lock: Mutex<()>,
}

impl CertificateManager {
    /// Creates a manager after validating `config`.
    pub fn new(config: CertificateConfig) -> Result<Self> {
        config.validate().context(InvalidConfigurationSnafu)?;

        Ok(Self {
            config,
            lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &CertificateConfig {
        &self.config
    }

    /// Returns the file layout of `common_name`. Nothing is checked on disk.
    pub fn subject_paths(&self, common_name: &str) -> Result<SubjectPaths> {
        validate_common_name(common_name).context(InvalidSubjectSnafu)?;
        Ok(SubjectPaths::resolve(&self.config, common_name))
    }

    /// Generates a key pair for the subject described by `subject_fields`
    /// (CN, OU, O, L, ST, C, E in this order), writes it together with a
    /// signed CSR and seeds the subject's keystore with the trust anchors.
    ///
    /// Every file is created new. If the call fails, the files it already
    /// created are removed again and existing files are left alone.
    #[instrument(
        name = "create_certificate_request",
        skip_all,
        fields(
            certificate.common_name = tracing::field::Empty,
            certificate.validity_days = validity_days,
            key.size = key_size,
        )
    )]
    pub fn create_certificate_request<S>(
        &self,
        subject_fields: &[S],
        store_password: &str,
        validity_days: u32,
        key_size: usize,
    ) -> Result<CertificateRequestFiles>
    where
        S: AsRef<str>,
    {
        let subject = SubjectIdentity::from_fields(subject_fields).context(InvalidSubjectSnafu)?;
        tracing::Span::current().record("certificate.common_name", subject.common_name.as_str());

        ensure!(!store_password.is_empty(), EmptyStorePasswordSnafu);
        ensure!(validity_days > 0, InvalidValiditySnafu);
        ensure!(key_size > 0, InvalidKeySizeSnafu);

        let _guard = self.acquire();
        create_certificate_request(
            &self.config,
            subject,
            store_password,
            validity_days,
            key_size,
        )
    }

    /// Installs the signed certificate of `common_name` into `keystore_file`,
    /// together with the private key and the chain of trust.
    ///
    /// The certificate is taken as given unless
    /// [`CertificateConfig::verify_chain`] is set.
    ///
    /// The keystore is replaced atomically. On error its previous contents
    /// are left intact.
    #[instrument(
        name = "apply_certificate_request",
        skip_all,
        fields(certificate.common_name = common_name)
    )]
    pub fn apply_certificate_request(
        &self,
        common_name: &str,
        signed_certificate_file: impl AsRef<Path>,
        keystore_file: impl AsRef<Path>,
        store_password: &str,
    ) -> Result<bool> {
        validate_common_name(common_name).context(InvalidSubjectSnafu)?;
        ensure!(!store_password.is_empty(), EmptyStorePasswordSnafu);

        let _guard = self.acquire();
        apply_certificate_request(
            &self.config,
            common_name,
            signed_certificate_file.as_ref(),
            keystore_file.as_ref(),
            store_password,
        )
    }

    /// Reports the lifecycle state of `common_name` by inspecting its keystore.
    #[instrument(
        name = "subject_state",
        skip_all,
        fields(certificate.common_name = common_name)
    )]
    pub fn subject_state(&self, common_name: &str, store_password: &str) -> Result<SubjectState> {
        let paths = self.subject_paths(common_name)?;

        let _guard = self.acquire();
        let keystore_file = &paths.keystore.file;
        if !keystore_file.is_file() {
            return Ok(SubjectState::NoRequest);
        }

        let keystore = open_keystore(keystore_file, store_password)?;
        let state = if keystore.contains_key_entry(common_name) {
            SubjectState::Issued
        } else {
            SubjectState::Requested
        };

        debug!(
            subject.state = %state,
            keystore.path = %keystore_file.display(),
            "determined subject state"
        );
        Ok(state)
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        // The guarded state lives on disk, a panic in another operation
        // leaves nothing behind in the mutex.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
