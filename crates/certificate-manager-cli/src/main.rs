use std::path::PathBuf;

use certificate_manager::{
    CertificateManagementError, CertificateManager,
    config::{self, ConfigPath, KeyAlgorithm},
    consts::{DEFAULT_CONFIG_SEARCH_PATHS, DEFAULT_RSA_KEY_SIZE},
    keys::ecdsa,
};
use clap::{Args, Parser, Subcommand};
use const_format::concatcp;
use snafu::{ResultExt, Snafu};

mod logging;

const APP_NAME: &str = "certificate-manager";
const ENV_PREFIX: &str = "CERTIFICATE_MANAGER";

const CONFIG_ENV: &str = concatcp!(ENV_PREFIX, "_CONFIG");
const STORE_PASSWORD_ENV: &str = concatcp!(ENV_PREFIX, "_STORE_PASSWORD");
const LOG_ENV: &str = concatcp!(ENV_PREFIX, "_LOG");
const LOG_DIRECTORY_ENV: &str = concatcp!(LOG_ENV, "_DIRECTORY");

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to load configuration"))]
    LoadConfiguration { source: config::Error },

    #[snafu(display("failed to set up certificate manager"))]
    CreateManager { source: CertificateManagementError },

    #[snafu(display("failed to create certificate signing request"))]
    CreateRequest { source: CertificateManagementError },

    #[snafu(display("failed to apply signed certificate for {common_name:?}"))]
    ApplyCertificate {
        source: CertificateManagementError,
        common_name: String,
    },

    #[snafu(display("failed to determine state of {common_name:?}"))]
    SubjectState {
        source: CertificateManagementError,
        common_name: String,
    },
}

#[derive(Debug, Parser)]
#[command(
    name = APP_NAME,
    author,
    version,
    about = "Creates certificate signing requests and installs the signed certificates into PKCS#12 keystores"
)]
struct Cli {
    /// Path to the YAML configuration. Without it, the default locations are
    /// searched.
    #[arg(long, short = 'c', value_name = "FILE", default_value = "", env = CONFIG_ENV, global = true)]
    config: ConfigPath,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a key pair, a certificate signing request and a keystore
    /// seeded with the trust anchors for a subject.
    Request(RequestArguments),

    /// Install a signed certificate into the subject's keystore.
    Apply(ApplyArguments),

    /// Print the lifecycle state of a subject.
    State(StateArguments),
}

#[derive(Debug, Args)]
struct RequestArguments {
    /// Subject fields, given seven times in the order CN, OU, O, L, ST, C, E.
    #[arg(long = "subject", value_name = "VALUE", required = true)]
    subject: Vec<String>,

    #[command(flatten)]
    store_password: StorePassword,

    /// Requested validity of the certificate in days.
    #[arg(long, default_value_t = 365)]
    validity_days: u32,

    /// Key size in bits. Defaults to the size matching the configured key
    /// algorithm.
    #[arg(long)]
    key_size: Option<usize>,
}

#[derive(Debug, Args)]
struct ApplyArguments {
    /// Common name of the subject the certificate was issued for.
    #[arg(long)]
    common_name: String,

    /// The signed certificate returned by the CA, PEM or DER encoded.
    #[arg(long, value_name = "FILE")]
    certificate: PathBuf,

    /// The subject's keystore. Defaults to the keystore created by `request`.
    #[arg(long, value_name = "FILE")]
    keystore: Option<PathBuf>,

    #[command(flatten)]
    store_password: StorePassword,
}

#[derive(Debug, Args)]
struct StateArguments {
    #[arg(long)]
    common_name: String,

    #[command(flatten)]
    store_password: StorePassword,
}

#[derive(Debug, Args)]
struct StorePassword {
    /// Password protecting the subject's keystore.
    #[arg(long = "store-password", env = STORE_PASSWORD_ENV, hide_env_values = true)]
    value: String,
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    logging::initialize_logging(LOG_ENV, LOG_DIRECTORY_ENV, APP_NAME)
        .context(InitializeLoggingSnafu)?;

    let config = cli
        .config
        .load(&DEFAULT_CONFIG_SEARCH_PATHS)
        .context(LoadConfigurationSnafu)?;
    let manager = CertificateManager::new(config).context(CreateManagerSnafu)?;

    match cli.command {
        Command::Request(arguments) => {
            let key_size = arguments
                .key_size
                .unwrap_or_else(|| default_key_size(manager.config().key_algorithm));
            let files = manager
                .create_certificate_request(
                    &arguments.subject,
                    &arguments.store_password.value,
                    arguments.validity_days,
                    key_size,
                )
                .context(CreateRequestSnafu)?;

            println!("private key: {}", files.private_key.display());
            println!("public key:  {}", files.public_key.display());
            println!("request:     {}", files.csr.display());
            println!("keystore:    {}", files.keystore.display());
        }
        Command::Apply(arguments) => {
            let common_name = arguments.common_name;
            let keystore = match arguments.keystore {
                Some(keystore) => keystore,
                None => {
                    manager
                        .subject_paths(&common_name)
                        .context(ApplyCertificateSnafu {
                            common_name: &common_name,
                        })?
                        .keystore
                        .file
                }
            };

            manager
                .apply_certificate_request(
                    &common_name,
                    &arguments.certificate,
                    &keystore,
                    &arguments.store_password.value,
                )
                .context(ApplyCertificateSnafu {
                    common_name: &common_name,
                })?;

            println!("installed certificate into {}", keystore.display());
        }
        Command::State(arguments) => {
            let state = manager
                .subject_state(&arguments.common_name, &arguments.store_password.value)
                .context(SubjectStateSnafu {
                    common_name: &arguments.common_name,
                })?;

            println!("{state}");
        }
    }

    Ok(())
}

fn default_key_size(key_algorithm: KeyAlgorithm) -> usize {
    match key_algorithm {
        KeyAlgorithm::Rsa => DEFAULT_RSA_KEY_SIZE,
        KeyAlgorithm::Ec => ecdsa::KEY_SIZE,
    }
}
