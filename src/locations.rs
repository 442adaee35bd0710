use crate::errors::{DeskError, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

pub(crate) fn get_default_storage_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new()
        .ok_or_else(|| DeskError::persistence("Could not locate the home directory"))?;
    Ok(base_dirs.home_dir().join("deskide"))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }
    Ok(path)
}

pub(crate) fn get_storage_dir(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) => ensure_dir(path.to_path_buf()),
        None => ensure_dir(get_default_storage_dir()?),
    }
}

pub(crate) fn get_log_dir(storage_dir: &Path) -> Result<PathBuf> {
    ensure_dir(storage_dir.join("logs"))
}

pub(crate) fn get_db_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join("projects.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_storage_dir() {
        let root = std::env::temp_dir().join(format!("deskide-{}", uuid::Uuid::new_v4()));
        let storage = get_storage_dir(Some(&root)).unwrap();
        assert!(storage.is_dir());
        let logs = get_log_dir(&storage).unwrap();
        assert!(logs.is_dir());
        assert_eq!(get_db_path(&storage), root.join("projects.db"));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
