//! Configuration of the [`CertificateManager`](crate::CertificateManager).
//!
//! The configuration is usually loaded from a YAML file located via
//! [`ConfigPath`], but it can also be assembled in code using
//! [`CertificateConfig::builder`].
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use bon::Builder;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use strum::{Display, EnumString};
use tracing::{debug, instrument};

use crate::consts::{
    DEFAULT_CSR_DIRECTORY, DEFAULT_CSR_EXTENSION, DEFAULT_INTERMEDIATE_CERTIFICATE_ALIAS,
    DEFAULT_KEYSTORE_DIRECTORY, DEFAULT_KEYSTORE_EXTENSION, DEFAULT_PRIVATE_KEY_DIRECTORY,
    DEFAULT_PRIVATE_KEY_EXTENSION, DEFAULT_PUBLIC_KEY_DIRECTORY, DEFAULT_PUBLIC_KEY_EXTENSION,
    DEFAULT_ROOT_CERTIFICATE_ALIAS, X509_CERTIFICATE_FACTORY,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read configuration file {path:?}"))]
    ReadConfigFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to deserialize configuration file {path:?}"))]
    DeserializeConfig {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display(
        "failed to locate a required file in any of the following locations: {search_path:?}"
    ))]
    RequiredFileMissing { search_path: Vec<PathBuf> },

    #[snafu(display(
        "unsupported certificate factory {factory:?}, only {X509_CERTIFICATE_FACTORY} is supported"
    ))]
    UnsupportedCertificateFactory { factory: String },

    #[snafu(display(
        "unsupported algorithm combination: key algorithm {key_algorithm} cannot be used with signature algorithm {signature_algorithm}"
    ))]
    UnsupportedAlgorithm {
        key_algorithm: KeyAlgorithm,
        signature_algorithm: SignatureAlgorithm,
    },

    #[snafu(display("the {kind} certificate alias must not be empty"))]
    EmptyAlias { kind: &'static str },

    #[snafu(display("root and intermediate certificates must use different aliases, both are {alias:?}"))]
    DuplicateAlias { alias: String },

    #[snafu(display("the {kind} file extension must not be empty"))]
    EmptyFileExtension { kind: &'static str },
}

/// The asymmetric key algorithm used for freshly generated subject keys.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum KeyAlgorithm {
    #[default]
    #[serde(rename = "RSA")]
    #[strum(to_string = "RSA")]
    Rsa,

    /// ECDSA on the NIST P-256 curve.
    #[serde(rename = "EC", alias = "ECDSA")]
    #[strum(to_string = "EC", serialize = "ECDSA")]
    Ec,
}

/// The algorithm used to sign certificate signing requests.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum SignatureAlgorithm {
    #[default]
    #[serde(rename = "SHA256withRSA")]
    #[strum(to_string = "SHA256withRSA")]
    Sha256WithRsa,

    #[serde(rename = "SHA256withECDSA")]
    #[strum(to_string = "SHA256withECDSA")]
    Sha256WithEcdsa,
}

impl SignatureAlgorithm {
    /// The key algorithm the signing key must use.
    pub fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            Self::Sha256WithRsa => KeyAlgorithm::Rsa,
            Self::Sha256WithEcdsa => KeyAlgorithm::Ec,
        }
    }
}

/// File name extensions (without the leading dot) of the per-subject files.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileExtensions {
    pub private_key: String,
    pub public_key: String,
    pub csr: String,
    pub keystore: String,
}

impl Default for FileExtensions {
    fn default() -> Self {
        Self {
            private_key: DEFAULT_PRIVATE_KEY_EXTENSION.to_owned(),
            public_key: DEFAULT_PUBLIC_KEY_EXTENSION.to_owned(),
            csr: DEFAULT_CSR_EXTENSION.to_owned(),
            keystore: DEFAULT_KEYSTORE_EXTENSION.to_owned(),
        }
    }
}

/// Everything the [`CertificateManager`](crate::CertificateManager) needs to
/// know about the directory layout, the algorithms and the trust anchors.
///
/// Relative base directories are resolved against [`Self::root_directory`].
///
/// ```
/// use certificate_manager::config::CertificateConfig;
///
/// let config = CertificateConfig::builder()
///     .root_directory("/var/lib/certificates")
///     .root_certificate_file("/etc/pki/root.pem")
///     .intermediate_certificate_file("/etc/pki/intermediate.pem")
///     .build();
///
/// assert_eq!(
///     config.private_key_base_directory(),
///     std::path::Path::new("/var/lib/certificates/private")
/// );
/// ```
#[derive(Builder, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CertificateConfig {
    #[builder(into)]
    pub root_directory: PathBuf,

    #[builder(into, default = PathBuf::from(DEFAULT_PRIVATE_KEY_DIRECTORY))]
    #[serde(default = "default_private_key_directory")]
    pub private_key_directory: PathBuf,

    #[builder(into, default = PathBuf::from(DEFAULT_PUBLIC_KEY_DIRECTORY))]
    #[serde(default = "default_public_key_directory")]
    pub public_key_directory: PathBuf,

    #[builder(into, default = PathBuf::from(DEFAULT_CSR_DIRECTORY))]
    #[serde(default = "default_csr_directory")]
    pub csr_directory: PathBuf,

    #[builder(into, default = PathBuf::from(DEFAULT_KEYSTORE_DIRECTORY))]
    #[serde(default = "default_keystore_directory")]
    pub keystore_directory: PathBuf,

    #[builder(default)]
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,

    #[builder(default)]
    #[serde(default)]
    pub key_algorithm: KeyAlgorithm,

    #[builder(into, default = X509_CERTIFICATE_FACTORY.to_owned())]
    #[serde(default = "default_certificate_factory")]
    pub certificate_factory: String,

    #[builder(into)]
    pub root_certificate_file: PathBuf,

    #[builder(into, default = DEFAULT_ROOT_CERTIFICATE_ALIAS.to_owned())]
    #[serde(default = "default_root_certificate_alias")]
    pub root_certificate_alias: String,

    #[builder(into)]
    pub intermediate_certificate_file: PathBuf,

    #[builder(into, default = DEFAULT_INTERMEDIATE_CERTIFICATE_ALIAS.to_owned())]
    #[serde(default = "default_intermediate_certificate_alias")]
    pub intermediate_certificate_alias: String,

    #[builder(default)]
    #[serde(default)]
    pub file_extensions: FileExtensions,

    /// Requires applied certificates to be issued by the configured
    /// intermediate and to match the subject's private key. Off by default,
    /// so locally self-signed certificates can be installed as well.
    #[builder(default)]
    #[serde(default)]
    pub verify_chain: bool,
}

fn default_private_key_directory() -> PathBuf {
    PathBuf::from(DEFAULT_PRIVATE_KEY_DIRECTORY)
}

fn default_public_key_directory() -> PathBuf {
    PathBuf::from(DEFAULT_PUBLIC_KEY_DIRECTORY)
}

fn default_csr_directory() -> PathBuf {
    PathBuf::from(DEFAULT_CSR_DIRECTORY)
}

fn default_keystore_directory() -> PathBuf {
    PathBuf::from(DEFAULT_KEYSTORE_DIRECTORY)
}

fn default_certificate_factory() -> String {
    X509_CERTIFICATE_FACTORY.to_owned()
}

fn default_root_certificate_alias() -> String {
    DEFAULT_ROOT_CERTIFICATE_ALIAS.to_owned()
}

fn default_intermediate_certificate_alias() -> String {
    DEFAULT_INTERMEDIATE_CERTIFICATE_ALIAS.to_owned()
}

impl CertificateConfig {
    /// Reads and deserializes the configuration from the YAML file at `path`.
    #[instrument(name = "load_certificate_config")]
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context(ReadConfigFileSnafu { path })?;
        let config: Self =
            serde_yaml::from_str(&contents).context(DeserializeConfigSnafu { path })?;

        debug!(
            config.root_directory = %config.root_directory.display(),
            config.key_algorithm = %config.key_algorithm,
            config.signature_algorithm = %config.signature_algorithm,
            "loaded certificate configuration"
        );

        Ok(config)
    }

    /// Checks the combinations of values serde and the builder can't reject
    /// on their own.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.certificate_factory
                .eq_ignore_ascii_case(X509_CERTIFICATE_FACTORY),
            UnsupportedCertificateFactorySnafu {
                factory: self.certificate_factory.clone()
            }
        );

        ensure!(
            self.signature_algorithm.key_algorithm() == self.key_algorithm,
            UnsupportedAlgorithmSnafu {
                key_algorithm: self.key_algorithm,
                signature_algorithm: self.signature_algorithm,
            }
        );

        ensure!(
            !self.root_certificate_alias.is_empty(),
            EmptyAliasSnafu { kind: "root" }
        );
        ensure!(
            !self.intermediate_certificate_alias.is_empty(),
            EmptyAliasSnafu {
                kind: "intermediate"
            }
        );
        ensure!(
            self.root_certificate_alias != self.intermediate_certificate_alias,
            DuplicateAliasSnafu {
                alias: self.root_certificate_alias.clone()
            }
        );

        let extensions = [
            ("private key", &self.file_extensions.private_key),
            ("public key", &self.file_extensions.public_key),
            ("CSR", &self.file_extensions.csr),
            ("keystore", &self.file_extensions.keystore),
        ];
        for (kind, extension) in extensions {
            ensure!(!extension.is_empty(), EmptyFileExtensionSnafu { kind });
        }

        Ok(())
    }

    pub fn private_key_base_directory(&self) -> PathBuf {
        self.resolve_directory(&self.private_key_directory)
    }

    pub fn public_key_base_directory(&self) -> PathBuf {
        self.resolve_directory(&self.public_key_directory)
    }

    pub fn csr_base_directory(&self) -> PathBuf {
        self.resolve_directory(&self.csr_directory)
    }

    pub fn keystore_base_directory(&self) -> PathBuf {
        self.resolve_directory(&self.keystore_directory)
    }

    /// Absolute directories are taken as they are, relative ones are
    /// interpreted relative to the root directory.
    fn resolve_directory(&self, directory: &Path) -> PathBuf {
        if directory.is_absolute() {
            directory.to_owned()
        } else {
            self.root_directory.join(directory)
        }
    }
}

/// A path to a [`CertificateConfig`] YAML file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigPath {
    path: Option<PathBuf>,
}

impl From<&OsStr> for ConfigPath {
    fn from(s: &OsStr) -> Self {
        Self {
            // clap doesn't let us see the underlying `Option<&str>`, so the
            // otherwise-invalid `""` is a sentinel for using the defaults.
            path: if s.is_empty() { None } else { Some(s.into()) },
        }
    }
}

impl ConfigPath {
    /// Load the [`CertificateConfig`] from the given path, falling back to the
    /// first path that exists from `default_search_paths` if none is given by
    /// the user.
    pub fn load(&self, default_search_paths: &[impl AsRef<Path>]) -> Result<CertificateConfig> {
        let resolved_path = Self::resolve_path(self.path.as_deref(), default_search_paths)?;
        CertificateConfig::from_yaml_file(resolved_path)
    }

    /// Check if the path can be found anywhere
    ///
    /// 1. User provides path `user_provided_path` to file. Return [`Error`] if not existing.
    /// 2. User does not provide path to file -> search in `default_paths` and
    ///    take the first existing file.
    /// 3. Return [`Error`] if nothing was found.
    fn resolve_path<'a>(
        user_provided_path: Option<&'a Path>,
        default_paths: &'a [impl AsRef<Path> + 'a],
    ) -> Result<&'a Path> {
        let search_paths = if let Some(path) = user_provided_path {
            vec![path]
        } else {
            default_paths.iter().map(|path| path.as_ref()).collect()
        };

        search_paths
            .iter()
            .copied()
            .find(|path| path.exists())
            .ok_or_else(|| Error::RequiredFileMissing {
                search_path: search_paths.iter().copied().map(PathBuf::from).collect(),
            })
    }
}
