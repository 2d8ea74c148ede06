use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Lines, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use super::fs_ops::{copy_file_atomic, remove_if_exists};
use super::store::{COVERAGE_FILE, DRIFT_FILE};
use super::{
    Category, ChangeSetError, ChangeSetReader, ChangeSetStore, ChangeSetWriter, FileEntry,
    Headers,
};

/// Changeset store that keeps one directory per (resource, definition).
///
/// Layout: `<root>/<resource_id>/<definition_name>/{changeset.txt,drift-changeset.txt,...}`.
/// Each file holds one JSON record per line: the headers first, then entries.
#[derive(Debug, Clone)]
pub struct DirChangeSetStore {
    root: PathBuf,
}

impl DirChangeSetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn definition_dir(
        &self,
        resource_id: i32,
        definition_name: &str,
    ) -> Result<PathBuf, ChangeSetError> {
        if !is_valid_dir_name(definition_name) {
            return Err(ChangeSetError::InvalidName(definition_name.to_string()));
        }
        Ok(self
            .root
            .join(resource_id.to_string())
            .join(definition_name))
    }
}

impl ChangeSetStore for DirChangeSetStore {
    fn find_changeset(
        &self,
        resource_id: i32,
        definition_name: &str,
        category: Category,
    ) -> Result<PathBuf, ChangeSetError> {
        let dir = self.definition_dir(resource_id, definition_name)?;
        fs::create_dir_all(&dir).map_err(|source| ChangeSetError::io(&dir, source))?;
        let file_name = match category {
            Category::Coverage => COVERAGE_FILE,
            Category::Drift => DRIFT_FILE,
        };
        Ok(dir.join(file_name))
    }

    fn reader(&self, path: &Path) -> Result<Box<dyn ChangeSetReader>, ChangeSetError> {
        Ok(Box::new(JsonLinesReader::open(path)?))
    }

    fn writer(
        &self,
        path: &Path,
        headers: Headers,
    ) -> Result<Box<dyn ChangeSetWriter>, ChangeSetError> {
        Ok(Box::new(JsonLinesWriter::create(path, &headers)?))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), ChangeSetError> {
        copy_file_atomic(from, to)
    }

    fn remove(&self, path: &Path) -> Result<(), ChangeSetError> {
        remove_if_exists(path)
    }

    fn delete_changesets(
        &self,
        resource_id: i32,
        definition_name: &str,
    ) -> Result<(), ChangeSetError> {
        let dir = self.definition_dir(resource_id, definition_name)?;
        if !dir.exists() {
            return Ok(());
        }
        debug!(dir = %dir.display(), "Deleting changesets for definition");
        fs::remove_dir_all(&dir).map_err(|source| ChangeSetError::io(&dir, source))
    }
}

fn is_valid_dir_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

struct JsonLinesReader {
    path: PathBuf,
    headers: Headers,
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl JsonLinesReader {
    fn open(path: &Path) -> Result<Self, ChangeSetError> {
        let file = File::open(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ChangeSetError::NotFound(path.to_path_buf())
            } else {
                ChangeSetError::io(path, source)
            }
        })?;
        let mut lines = BufReader::new(file).lines();
        let first = lines
            .next()
            .ok_or_else(|| ChangeSetError::MissingHeaders(path.to_path_buf()))?
            .map_err(|source| ChangeSetError::io(path, source))?;
        let headers = serde_json::from_str(&first).map_err(|source| ChangeSetError::Parse {
            path: path.to_path_buf(),
            line: 1,
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            headers,
            lines,
            line: 1,
        })
    }
}

impl Iterator for JsonLinesReader {
    type Item = Result<FileEntry, ChangeSetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => return Some(Err(ChangeSetError::io(&self.path, source))),
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&line).map_err(|source| ChangeSetError::Parse {
                    path: self.path.clone(),
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

impl ChangeSetReader for JsonLinesReader {
    fn headers(&self) -> &Headers {
        &self.headers
    }
}

struct JsonLinesWriter {
    target: PathBuf,
    out: BufWriter<NamedTempFile>,
}

impl JsonLinesWriter {
    fn create(target: &Path, headers: &Headers) -> Result<Self, ChangeSetError> {
        let dir = target
            .parent()
            .ok_or_else(|| ChangeSetError::NotFound(target.to_path_buf()))?;
        fs::create_dir_all(dir).map_err(|source| ChangeSetError::io(dir, source))?;
        let staging =
            NamedTempFile::new_in(dir).map_err(|source| ChangeSetError::io(dir, source))?;
        let mut writer = Self {
            target: target.to_path_buf(),
            out: BufWriter::new(staging),
        };
        writer.write_record(headers)?;
        Ok(writer)
    }

    fn write_record<T: serde::Serialize>(&mut self, record: &T) -> Result<(), ChangeSetError> {
        serde_json::to_writer(&mut self.out, record).map_err(|source| ChangeSetError::Encode {
            path: self.target.clone(),
            source,
        })?;
        self.out
            .write_all(b"\n")
            .map_err(|source| ChangeSetError::io(&self.target, source))
    }
}

impl ChangeSetWriter for JsonLinesWriter {
    fn write(&mut self, entry: &FileEntry) -> Result<(), ChangeSetError> {
        self.write_record(entry)
    }

    fn close(self: Box<Self>) -> Result<(), ChangeSetError> {
        let Self { target, out } = *self;
        let staging = out
            .into_inner()
            .map_err(|err| ChangeSetError::io(&target, err.into_error()))?;
        staging
            .as_file()
            .sync_all()
            .map_err(|source| ChangeSetError::io(&target, source))?;
        staging
            .persist(&target)
            .map_err(|err| ChangeSetError::io(&target, err.error))?;
        Ok(())
    }
}
