use std::path::{Path, PathBuf};

use snafu::ensure;

use crate::{
    config::CertificateConfig,
    error::{MissingSubjectDirectorySnafu, Result},
};

/// A file of a subject together with the directory it lives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectFile {
    pub directory: PathBuf,
    pub file: PathBuf,
}

impl SubjectFile {
    fn new(base_directory: PathBuf, common_name: &str, extension: &str) -> Self {
        let directory = base_directory.join(common_name);
        let file = directory.join(format!("{common_name}.{extension}"));
        Self { directory, file }
    }
}

/// The per-subject file layout: `<base>/<CN>/<CN>.<extension>` for each of
/// the four base directories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectPaths {
    pub private_key: SubjectFile,
    pub public_key: SubjectFile,
    pub csr: SubjectFile,
    pub keystore: SubjectFile,
}

impl SubjectPaths {
    /// Resolves the layout for `common_name`. Nothing is checked on disk.
    pub fn resolve(config: &CertificateConfig, common_name: &str) -> Self {
        let extensions = &config.file_extensions;

        Self {
            private_key: SubjectFile::new(
                config.private_key_base_directory(),
                common_name,
                &extensions.private_key,
            ),
            public_key: SubjectFile::new(
                config.public_key_base_directory(),
                common_name,
                &extensions.public_key,
            ),
            csr: SubjectFile::new(config.csr_base_directory(), common_name, &extensions.csr),
            keystore: SubjectFile::new(
                config.keystore_base_directory(),
                common_name,
                &extensions.keystore,
            ),
        }
    }

    fn directories(&self) -> [(&'static str, &Path); 4] {
        [
            ("private key", self.private_key.directory.as_path()),
            ("public key", self.public_key.directory.as_path()),
            ("CSR", self.csr.directory.as_path()),
            ("keystore", self.keystore.directory.as_path()),
        ]
    }

    /// Fails with the first subject directory which doesn't exist.
    pub fn ensure_directories_exist(&self) -> Result<()> {
        for (kind, directory) in self.directories() {
            ensure!(
                directory.is_dir(),
                MissingSubjectDirectorySnafu {
                    kind,
                    path: directory
                }
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CertificateManagementError, test_utils::TestEnvironment};

    #[test]
    fn layout_follows_the_configuration() {
        let config = CertificateConfig::builder()
            .root_directory("/srv/certs")
            .keystore_directory("/var/keystores")
            .root_certificate_file("root.pem")
            .intermediate_certificate_file("intermediate.pem")
            .build();

        let paths = SubjectPaths::resolve(&config, "test.local");

        assert_eq!(
            paths.private_key.file,
            PathBuf::from("/srv/certs/private/test.local/test.local.key")
        );
        assert_eq!(
            paths.public_key.file,
            PathBuf::from("/srv/certs/public/test.local/test.local.pub")
        );
        assert_eq!(
            paths.csr.file,
            PathBuf::from("/srv/certs/csr/test.local/test.local.csr")
        );
        assert_eq!(
            paths.keystore.directory,
            PathBuf::from("/var/keystores/test.local")
        );
        assert_eq!(
            paths.keystore.file,
            PathBuf::from("/var/keystores/test.local/test.local.p12")
        );
    }

    #[test]
    fn missing_directories_are_reported_in_order() {
        let env = TestEnvironment::new();
        let paths = SubjectPaths::resolve(&env.config, "test.local");

        let error = paths.ensure_directories_exist().unwrap_err();
        assert!(matches!(
            error,
            CertificateManagementError::MissingSubjectDirectory { kind: "private key", .. }
        ));

        env.create_subject_directories("test.local");
        assert!(paths.ensure_directories_exist().is_ok());
    }
}
