//! File primitives shared by the request builder and the applier.
//!
//! The request builder never overwrites anything: every file is created with
//! create-new semantics through [`CreatedFiles`], which removes the files it
//! created again unless [`CreatedFiles::commit`] is called. The applier
//! replaces the keystore through [`replace_atomically`].
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use snafu::{ResultExt, ensure};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{
    CreateFileSnafu, FileAlreadyExistsSnafu, KeystoreDirectoryUnavailableSnafu, Result,
    WriteFileSnafu,
};

/// Tracks the files created during one operation.
///
/// Dropping an uncommitted instance removes all tracked files, newest first.
#[derive(Debug, Default)]
pub(crate) struct CreatedFiles {
    paths: Vec<PathBuf>,
}

impl CreatedFiles {
    /// Creates `path`, failing if it already exists, and writes `contents`.
    /// On Unix the file is only accessible by its owner.
    ///
    /// The file is tracked as soon as it was created, so a failed write is
    /// cleaned up as well.
    pub fn create_new(&mut self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

        let mut file = match options.open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                return FileAlreadyExistsSnafu { path }.fail();
            }
            Err(error) => return Err(error).context(CreateFileSnafu { path }),
        };
        self.paths.push(path.to_owned());

        file.write_all(contents).context(WriteFileSnafu { path })?;
        file.sync_all().context(WriteFileSnafu { path })?;

        debug!(file.path = %path.display(), file.size = contents.len(), "created file");
        Ok(())
    }

    /// Keeps all tracked files.
    pub fn commit(mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths)
    }
}

impl Drop for CreatedFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..).rev() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(file.path = %path.display(), "removed partially created file"),
                Err(error) => warn!(
                    file.path = %path.display(),
                    error = &error as &dyn std::error::Error,
                    "failed to remove partially created file"
                ),
            }
        }
    }
}

/// Replaces the contents of `path` without ever exposing a partially written
/// file.
///
/// The contents are written to a temporary file in the same directory, which
/// is then renamed over `path`. On failure the original file is untouched.
pub(crate) fn replace_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure!(
        directory.is_dir(),
        KeystoreDirectoryUnavailableSnafu { path: directory }
    );

    let mut temporary =
        NamedTempFile::new_in(directory).context(CreateFileSnafu { path: directory })?;
    temporary
        .write_all(contents)
        .context(WriteFileSnafu { path: temporary.path() })?;
    temporary
        .as_file()
        .sync_all()
        .context(WriteFileSnafu { path: temporary.path() })?;

    temporary
        .persist(path)
        .map_err(|error| error.error)
        .context(WriteFileSnafu { path })?;

    debug!(file.path = %path.display(), file.size = contents.len(), "replaced file");
    Ok(())
}

/// Returns `true` if the current process can write to `path`.
///
/// Permission bits alone don't answer that (ownership, ACLs and read-only
/// mounts all matter), so the write is attempted: a file is opened for
/// writing without truncating it, a directory gets an anonymous temporary
/// file that is removed right away.
pub(crate) fn is_writable(path: &Path) -> bool {
    let writable = if path.is_dir() {
        tempfile::tempfile_in(path).is_ok()
    } else {
        OpenOptions::new().write(true).open(path).is_ok()
    };

    if !writable {
        debug!(file.path = %path.display(), "path is not writable");
    }
    writable
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn existing_files_are_never_overwritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subject.key");
        fs::write(&path, "original").unwrap();

        let mut created = CreatedFiles::default();
        let error = created.create_new(&path, b"replacement").unwrap_err();
        drop(created);

        assert!(error.is_file_exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn uncommitted_files_are_removed() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");

        let mut created = CreatedFiles::default();
        created.create_new(&first, b"1").unwrap();
        created.create_new(&second, b"2").unwrap();
        drop(created);

        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn committed_files_are_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kept");

        let mut created = CreatedFiles::default();
        created.create_new(&path, b"kept").unwrap();
        assert_eq!(created.commit(), vec![path.clone()]);

        assert_eq!(fs::read(&path).unwrap(), b"kept");
    }

    #[test]
    fn replace_atomically_swaps_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.p12");
        fs::write(&path, "old").unwrap();

        replace_atomically(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn writability_is_checked_by_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.p12");
        fs::write(&path, "contents").unwrap();

        assert!(is_writable(dir.path()));
        assert!(is_writable(&path));
        assert!(!is_writable(&dir.path().join("missing")));
        assert!(!is_writable(&dir.path().join("missing").join("store.p12")));

        // The check neither truncates files nor leaves anything behind.
        assert_eq!(fs::read(&path).unwrap(), b"contents");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_paths_are_not_writable() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let dir = tempdir().unwrap();
        let path = dir.path().join("store.p12");
        fs::write(&path, "contents").unwrap();

        // root bypasses permission bits, so there is nothing to observe.
        if fs::metadata(&path).unwrap().uid() == 0 {
            return;
        }

        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();
        assert!(!is_writable(&path));

        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        assert!(!is_writable(&locked));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn replace_atomically_requires_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("store.p12");

        assert!(replace_atomically(&path, b"new").is_err());
        assert!(!path.exists());
    }
}
