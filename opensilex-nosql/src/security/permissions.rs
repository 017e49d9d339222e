//! Ownership and permission checks for secret files.

use crate::error::NoSqlError;
use std::path::Path;

/// Ensures `path` is a regular file that only the current user can access.
///
/// On unix the file must be owned by the effective user of the process and
/// grant no permission to group or others (`mode & 0o077 == 0`). Symbolic
/// links are followed. This check runs before any read of a password, hash
/// or key file.
///
/// # Errors
/// Returns an I/O error if the file metadata cannot be read, and a security
/// error if the file is not a regular file, has another owner, or is
/// readable, writable or executable by group or others.
pub fn check_restrictive_permissions(path: &Path) -> crate::Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| NoSqlError::io(format!("reading metadata of {}", path.display()), e))?;

    if !metadata.is_file() {
        return Err(NoSqlError::security(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    check_unix_mode(path, &metadata)
}

#[cfg(unix)]
fn check_unix_mode(path: &Path, metadata: &std::fs::Metadata) -> crate::Result<()> {
    use std::os::unix::fs::MetadataExt;

    let owner = metadata.uid();
    let current = nix::unistd::geteuid().as_raw();
    if owner != current {
        return Err(NoSqlError::security(format!(
            "{} is owned by uid {owner}, expected uid {current}",
            path.display()
        )));
    }

    let mode = metadata.mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(NoSqlError::security(format!(
            "{} has permissions {mode:o}, expected no group or other access (e.g. 600)",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_unix_mode(path: &Path, _metadata: &std::fs::Metadata) -> crate::Result<()> {
    tracing::warn!(
        path = %path.display(),
        "File permission checks are only enforced on unix platforms"
    );
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    fn secret_file(mode: u32) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(file.path(), Permissions::from_mode(mode)).unwrap();
        file
    }

    #[test]
    fn test_owner_only_modes_accepted() {
        for mode in [0o600, 0o400, 0o700] {
            let file = secret_file(mode);
            assert!(
                check_restrictive_permissions(file.path()).is_ok(),
                "mode {mode:o} should be accepted"
            );
        }
    }

    #[test]
    fn test_group_or_world_access_rejected() {
        for mode in [0o644, 0o640, 0o604, 0o660, 0o610, 0o601] {
            let file = secret_file(mode);
            let error = check_restrictive_permissions(file.path()).unwrap_err();
            assert!(
                matches!(error, NoSqlError::Security { .. }),
                "mode {mode:o} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = check_restrictive_permissions(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(error, NoSqlError::Io { .. }));
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::set_permissions(dir.path(), Permissions::from_mode(0o700)).unwrap();
        let error = check_restrictive_permissions(dir.path()).unwrap_err();
        assert!(matches!(error, NoSqlError::Security { .. }));
    }
}
