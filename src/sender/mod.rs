//! Packaging of drift content for the collector.
//!
//! The collector asks for file content by hash. [`FilesSender`] resolves each
//! hash to a path through the coverage snapshot, streams the bytes into a zip
//! archive whose members are named by hash, and hands the archive to a
//! [`ContentTransport`].

mod errors;
mod source;
mod transport;

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::{BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use tracing::{debug, error, info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::changeset::{Category, ChangeSetStore, FileEntryType, Headers};

pub use errors::SendError;
pub use source::ContentSource;
pub use transport::{ContentTransport, OutboxTransport};

/// Result of one send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Archive that was handed off, if any content was packaged.
    pub archive: Option<PathBuf>,
    pub packaged: usize,
    /// Hashes that could not be resolved or read.
    pub skipped: usize,
}

/// Builds hash-named content archives for one resource.
pub struct FilesSender {
    store: Arc<dyn ChangeSetStore>,
    source: ContentSource,
    transport: Arc<dyn ContentTransport>,
}

impl FilesSender {
    pub fn new(
        store: Arc<dyn ChangeSetStore>,
        source: ContentSource,
        transport: Arc<dyn ContentTransport>,
    ) -> Self {
        Self {
            store,
            source,
            transport,
        }
    }

    /// Package the content behind `hashes` and hand it to the transport.
    ///
    /// Hashes are resolved through the definition's coverage snapshot and the
    /// files are read relative to `headers.base_dir`. A file that cannot be
    /// found or opened is logged and skipped. When nothing is packaged the
    /// archive is discarded and the transport is not called.
    pub fn send(
        &self,
        resource_id: i32,
        headers: &Headers,
        hashes: &[String],
    ) -> Result<SendOutcome, SendError> {
        let started = Instant::now();
        info!(
            resource_id,
            definition_id = headers.definition_id,
            definition = %headers.definition_name,
            files = hashes.len(),
            "Preparing to send content"
        );
        let coverage =
            self.store
                .find_changeset(resource_id, &headers.definition_name, Category::Coverage)?;
        let requested = unique(hashes);
        let resolved = self.resolve(&coverage, &requested)?;
        let mut skipped = requested.len() - resolved.len();
        for hash in requested.iter().filter(|hash| !resolved.contains_key(hash.as_str())) {
            warn!(
                resource_id,
                definition = %headers.definition_name,
                hash = %hash,
                "Unable to find file for content hash"
            );
        }

        let (archive, file) = create_archive(&coverage)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut packaged = 0;

        for hash in &requested {
            let Some(path) = resolved.get(hash.as_str()) else {
                continue;
            };
            let mut content = match self.source.open(&headers.base_dir, path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(
                        resource_id,
                        definition = %headers.definition_name,
                        path = %path,
                        error = %err,
                        "Failed to open file content, skipping"
                    );
                    skipped += 1;
                    continue;
                }
            };
            debug!(path = %path, archive = %archive.display(), "Adding file to content archive");
            let added = zip
                .start_file(hash.as_str(), options)
                .map_err(|source| SendError::Archive {
                    path: archive.clone(),
                    source,
                })
                .and_then(|()| {
                    std::io::copy(&mut content, &mut zip)
                        .map_err(|source| SendError::io(Path::new(path), source))
                });
            if let Err(err) = added {
                drop(zip);
                let _ = fs::remove_file(&archive);
                return Err(err);
            }
            packaged += 1;
        }

        let closed = zip
            .finish()
            .map_err(|source| SendError::Archive {
                path: archive.clone(),
                source,
            })
            .and_then(|mut writer| writer.flush().map_err(|source| SendError::io(&archive, source)));
        if let Err(err) = closed {
            let _ = fs::remove_file(&archive);
            if packaged > 0 {
                error!(
                    resource_id,
                    definition = %headers.definition_name,
                    error = %err,
                    "Failed to close content archive"
                );
                return Err(err);
            }
        }

        if packaged == 0 {
            let _ = fs::remove_file(&archive);
            debug!(resource_id, definition = %headers.definition_name, "No content to send");
            return Ok(SendOutcome {
                archive: None,
                packaged,
                skipped,
            });
        }

        self.transport
            .send_content(resource_id, &headers.definition_name, &archive)?;
        if archive.exists() {
            fs::remove_file(&archive).map_err(|source| SendError::io(&archive, source))?;
        }
        info!(
            resource_id,
            definition = %headers.definition_name,
            packaged,
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished submitting content"
        );
        Ok(SendOutcome {
            archive: Some(archive),
            packaged,
            skipped,
        })
    }

    /// Map requested hashes to relative paths.
    ///
    /// A single hash is found with one scan that stops at the first match;
    /// larger requests index the whole snapshot once.
    fn resolve<'h>(
        &self,
        coverage: &Path,
        requested: &[&'h String],
    ) -> Result<HashMap<&'h str, String>, SendError> {
        let mut resolved = HashMap::new();
        if let &[hash] = requested {
            for entry in self.store.reader(coverage)? {
                let entry = entry?;
                if entry.new_hash.as_deref() == Some(hash.as_str()) {
                    resolved.insert(hash.as_str(), entry.path);
                    break;
                }
            }
            return Ok(resolved);
        }
        let mut index = HashMap::new();
        for entry in self.store.reader(coverage)? {
            let entry = entry?;
            if let Some(hash) = entry.new_hash {
                index.insert(hash, entry.path);
            }
        }
        for &hash in requested {
            if let Some(path) = index.remove(hash.as_str()) {
                resolved.insert(hash.as_str(), path);
            }
        }
        Ok(resolved)
    }
}

/// Hashes of new content recorded in a changeset (added and changed entries).
pub fn content_hashes(store: &dyn ChangeSetStore, changeset: &Path) -> Result<Vec<String>, SendError> {
    let mut hashes = Vec::new();
    for entry in store.reader(changeset)? {
        let entry = entry?;
        if matches!(entry.kind, FileEntryType::Added | FileEntryType::Changed)
            && let Some(hash) = entry.new_hash
        {
            hashes.push(hash);
        }
    }
    Ok(hashes)
}

fn unique(hashes: &[String]) -> Vec<&String> {
    let mut seen = HashSet::new();
    hashes
        .iter()
        .filter(|hash| seen.insert(hash.as_str()))
        .collect()
}

/// Create `content_<epoch millis>.zip` beside the coverage snapshot.
///
/// The name is claimed with `create_new`; a taken name moves on to the next
/// millisecond so concurrent sends never share an archive.
fn create_archive(coverage: &Path) -> Result<(PathBuf, File), SendError> {
    let dir = coverage.parent().unwrap_or(Path::new("."));
    let mut millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    loop {
        let candidate = dir.join(format!("content_{millis}.zip"));
        match File::create_new(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => millis += 1,
            Err(source) => return Err(SendError::io(&candidate, source)),
        }
    }
}
