use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::SendError;

/// Delivers a finished content archive to the collector.
///
/// After `send_content` returns `Ok` the sender deletes the archive if it is
/// still in place, so implementations that copy rather than move are fine.
pub trait ContentTransport: Send + Sync {
    fn send_content(
        &self,
        resource_id: i32,
        definition_name: &str,
        archive: &Path,
    ) -> Result<(), SendError>;
}

/// Transport that moves archives into a local outbox directory for an
/// uploader process to pick up.
///
/// Delivered files are named `<resource_id>_<definition>_<archive name>`.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    dir: PathBuf,
}

impl OutboxTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target(&self, resource_id: i32, definition_name: &str, archive: &Path) -> PathBuf {
        let name = archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "content.zip".to_string());
        self.dir
            .join(format!("{resource_id}_{definition_name}_{name}"))
    }
}

impl ContentTransport for OutboxTransport {
    fn send_content(
        &self,
        resource_id: i32,
        definition_name: &str,
        archive: &Path,
    ) -> Result<(), SendError> {
        fs::create_dir_all(&self.dir).map_err(|source| SendError::io(&self.dir, source))?;
        let target = self.target(resource_id, definition_name, archive);
        if fs::rename(archive, &target).is_err() {
            // Rename fails across filesystems; fall back to copy through a staging name.
            let staging = target.with_extension("zip.part");
            fs::copy(archive, &staging).map_err(|source| SendError::io(&staging, source))?;
            fs::rename(&staging, &target).map_err(|source| {
                let _ = fs::remove_file(&staging);
                SendError::io(&target, source)
            })?;
        }
        debug!(target = %target.display(), "Moved content archive to outbox");
        Ok(())
    }
}
