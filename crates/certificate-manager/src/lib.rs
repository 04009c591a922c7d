//! This crate manages the certificate lifecycle of named subjects against a
//! two-level private CA (a root and an intermediate).
//!
//! For every subject it generates a key pair, writes a PKCS#10 certificate
//! signing request for the CA and seeds a PKCS#12 keystore with the trust
//! anchors. Once the CA returns the signed certificate, the certificate is
//! installed into the keystore together with the private key and the full
//! chain of trust. See [`CertificateManager`] for the entry point.
//!
//! ```no_run
//! use certificate_manager::{CertificateConfig, CertificateManager};
//!
//! let config = CertificateConfig::builder()
//!     .root_directory("/srv/certificates")
//!     .root_certificate_file("/srv/ca/root.pem")
//!     .intermediate_certificate_file("/srv/ca/intermediate.pem")
//!     .build();
//! let manager = CertificateManager::new(config)?;
//!
//! let files = manager.create_certificate_request(
//!     &["host.example.com", "Eng", "Acme", "City", "State", "US", "admin@example.com"],
//!     "changeit",
//!     365,
//!     2048,
//! )?;
//! println!("send {} to the CA", files.csr.display());
//! # Ok::<(), certificate_manager::CertificateManagementError>(())
//! ```
//!
//! ## References
//!
//! - <https://datatracker.ietf.org/doc/html/rfc2986>
//! - <https://datatracker.ietf.org/doc/html/rfc4514>
//! - <https://datatracker.ietf.org/doc/html/rfc5280>
//! - <https://datatracker.ietf.org/doc/html/rfc7292>
mod apply;
mod files;

pub mod chain;
pub mod config;
pub mod consts;
pub mod error;
pub mod keys;
pub mod keystore;
pub mod manager;
pub mod paths;
pub mod request;
pub mod subject;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::{
    config::CertificateConfig,
    error::{CertificateManagementError, Result},
    manager::{CertificateManager, SubjectState},
    request::CertificateRequestFiles,
    subject::SubjectIdentity,
};
