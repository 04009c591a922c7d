use x509_cert::der::pem::LineEnding;

/// The line ending used for every PEM file written by this crate.
pub const PEM_LINE_ENDING: LineEnding = LineEnding::LF;

/// The RSA key size in bits used when callers don't have a preference.
pub const DEFAULT_RSA_KEY_SIZE: usize = 2048;

/// The only supported certificate factory type.
pub const X509_CERTIFICATE_FACTORY: &str = "X.509";

pub const DEFAULT_ROOT_CERTIFICATE_ALIAS: &str = "root";
pub const DEFAULT_INTERMEDIATE_CERTIFICATE_ALIAS: &str = "intermediate";

pub const DEFAULT_PRIVATE_KEY_DIRECTORY: &str = "private";
pub const DEFAULT_PUBLIC_KEY_DIRECTORY: &str = "public";
pub const DEFAULT_CSR_DIRECTORY: &str = "csr";
pub const DEFAULT_KEYSTORE_DIRECTORY: &str = "keystore";

pub const DEFAULT_PRIVATE_KEY_EXTENSION: &str = "key";
pub const DEFAULT_PUBLIC_KEY_EXTENSION: &str = "pub";
pub const DEFAULT_CSR_EXTENSION: &str = "csr";
pub const DEFAULT_KEYSTORE_EXTENSION: &str = "p12";

/// Locations searched for the configuration file if none is given explicitly.
pub const DEFAULT_CONFIG_SEARCH_PATHS: [&str; 2] = [
    "certificate-manager.yaml",
    "/etc/certificate-manager/config.yaml",
];
