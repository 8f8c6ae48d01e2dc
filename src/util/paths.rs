use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ZfsyncError};

pub fn is_safe_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// A dataset name such as `backup/job1`: relative, slash separated, every
/// component a safe name.
pub fn is_safe_dataset(name: &str) -> bool {
    !name.is_empty() && name.split('/').all(is_safe_name)
}

/// An absolute path whose every component is a safe name. Volume paths are
/// sent to the agent through a remote shell, so nothing else is accepted.
pub fn is_safe_volume(path: &Path) -> bool {
    path.is_absolute()
        && path.file_name().is_some()
        && path.components().all(|c| match c {
            Component::RootDir => true,
            Component::Normal(name) => name.to_str().map(is_safe_name).unwrap_or(false),
            _ => false,
        })
}

pub fn path_has_parent_dir(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Filesystem location of a dataset mounted beneath `pool_root`.
pub fn dataset_dir(pool_root: &Path, dataset: &str) -> PathBuf {
    pool_root.join(dataset)
}

/// Creates `path` and any missing parents, restricting the leaf to its owner.
pub fn ensure_private_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(ZfsyncError::message(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| ZfsyncError::message(format!("create {}: {}", path.display(), e)))?;
    let mut perms = fs::metadata(path)
        .map_err(|e| ZfsyncError::message(format!("stat {}: {}", path.display(), e)))?
        .permissions();
    perms.set_mode(0o700);
    fs::set_permissions(path, perms)
        .map_err(|e| ZfsyncError::message(format!("chmod {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn volume_paths_must_be_plain_components() {
        assert!(is_safe_volume(Path::new("/dev/vg0/lv0")));
        assert!(!is_safe_volume(Path::new("dev/vg0/lv0")));
        assert!(!is_safe_volume(Path::new("/dev/vg 0/lv0")));
        assert!(!is_safe_volume(Path::new("/dev/vg0;reboot/lv0")));
        assert!(!is_safe_volume(Path::new("/")));
    }

    #[test]
    fn dataset_names() {
        assert!(is_safe_dataset("backup/job1"));
        assert!(!is_safe_dataset("backup//job1"));
        assert!(!is_safe_dataset("/backup/job1"));
        assert!(!is_safe_dataset("backup/../etc"));
    }

    #[test]
    fn private_dir_is_created_with_parents() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("a/b/c");
        ensure_private_dir(&target).expect("create");
        let mode = fs::metadata(&target).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        ensure_private_dir(&target).expect("idempotent");
    }
}
