//! Validation functions for the source and destination directories.

use validator::ValidationError;

use std::path::Path;

fn invalid_dir(message: String) -> ValidationError {
    ValidationError::new("InvalidDirectory").with_message(message.into())
}

/// The source tree must already be a directory.
pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    match std::fs::metadata(dir) {
        Ok(md) if md.is_dir() => Ok(()),
        Ok(_) => Err(invalid_dir(format!("{:?} is not a directory", dir))),
        Err(e) => Err(invalid_dir(format!("cannot access {:?}: {}", dir, e))),
    }
}

/// Creates `dir` with its parents when missing.
pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| {
            invalid_dir(format!("cannot create backup directory {:?}: {}", dir, e))
        })?;
    }
    validate_dir_exist(dir)
}

/// The backup root must accept new files for the running user.
///
/// Checked by creating an anonymous temporary file, since mode bits alone say
/// nothing about who owns the directory.
pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    tempfile::tempfile_in(dir)
        .map(drop)
        .map_err(|e| invalid_dir(format!("cannot write to {:?}: {}", dir, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_dir_exist() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        std::fs::write(&file, "").unwrap();

        assert!(validate_dir_exist(temp_dir.path()).is_ok());
        assert!(validate_dir_exist(&file).is_err());
        assert!(validate_dir_exist(temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_dir_exist_or_created_creates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b");

        assert!(validate_dir_exist_or_created(&nested).is_ok());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_writable_dir_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        std::fs::write(&file, "").unwrap();

        let err = validate_writable_dir(&file).unwrap_err();
        assert_eq!(err.code, "InvalidDirectory");
    }

    #[test]
    fn test_writable_dir_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();

        assert!(validate_writable_dir(temp_dir.path()).is_ok());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_writable_dir_checks_actual_access() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("dst");
        std::fs::create_dir(&dst).unwrap();
        std::fs::set_permissions(&dst, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Privileged users write through the mode bits.
        let really_locked = std::fs::File::create(dst.join("write-check")).is_err();

        let res = validate_writable_dir(&dst);
        std::fs::set_permissions(&dst, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(res.is_err(), really_locked);
    }
}
