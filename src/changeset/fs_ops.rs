use std::{
    fs,
    path::{Path, PathBuf},
};

use super::ChangeSetError;

/// Copy `src` over `dest` through a sibling staging file so readers never see
/// a half-written destination.
pub(crate) fn copy_file_atomic(src: &Path, dest: &Path) -> Result<(), ChangeSetError> {
    let new_path = with_suffix(dest, "new");
    if new_path.exists() {
        let _ = fs::remove_file(&new_path);
    }
    if !src.is_file() {
        return Err(ChangeSetError::NotFound(src.to_path_buf()));
    }
    fs::copy(src, &new_path).map_err(|source| ChangeSetError::io(src, source))?;
    fs::rename(&new_path, dest).map_err(|source| {
        let _ = fs::remove_file(&new_path);
        ChangeSetError::io(dest, source)
    })
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<(), ChangeSetError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ChangeSetError::io(path, source)),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("changeset")
        .to_string();
    name.push('.');
    name.push_str(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_replaces_destination_and_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("changeset.txt");
        let dest = dir.path().join("snapshot.pinned");
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();

        copy_file_atomic(&src, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert!(!dir.path().join("snapshot.pinned.new").exists());
    }

    #[test]
    fn copy_of_missing_source_is_not_found() {
        let dir = tempdir().unwrap();
        let err = copy_file_atomic(&dir.path().join("a"), &dir.path().join("b")).unwrap_err();
        assert!(matches!(err, ChangeSetError::NotFound(_)));
    }

    #[test]
    fn removing_a_missing_file_is_fine() {
        let dir = tempdir().unwrap();
        remove_if_exists(&dir.path().join("gone")).unwrap();
    }
}
