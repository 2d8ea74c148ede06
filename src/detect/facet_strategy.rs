use std::path::Path;

use crate::config::DriftDefinition;
use crate::facet::{DriftDetectionFacet, FileStatus, LockedFacet};

use super::filter::PathFilter;
use super::hash::sha256_reader;
use super::strategy::{DetectionStrategy, FileListing};
use super::DetectionError;

/// Detection through a resource component's [`DriftDetectionFacet`].
///
/// The base directory is whatever the facet understands it to be, so it is
/// always reported valid.
pub struct FacetStrategy {
    facet: LockedFacet,
}

impl FacetStrategy {
    pub fn new(facet: LockedFacet) -> Self {
        Self { facet }
    }
}

impl DetectionStrategy for FacetStrategy {
    fn is_base_dir_valid(&self, _base_dir: &Path) -> bool {
        true
    }

    fn all_files<'a>(
        &'a self,
        base_dir: &'a Path,
        definition: &'a DriftDefinition,
    ) -> Result<FileListing<'a>, DetectionError> {
        let filter = PathFilter::from_definition(definition)?;
        let drifts = self
            .facet
            .generate_snapshot(definition, &base_dir.to_string_lossy())?;
        Ok(Box::new(
            drifts
                .into_iter()
                .filter_map(|drift| drift.into_file_info())
                .filter(move |info| filter.matches(&info.path)),
        ))
    }

    fn file_status(
        &self,
        definition: &DriftDefinition,
        base_dir: &Path,
        path: &str,
    ) -> Result<FileStatus, DetectionError> {
        Ok(self
            .facet
            .file_status(definition, &base_dir.to_string_lossy(), path)?)
    }

    fn sha256(&self, base_dir: &Path, path: &str) -> Result<String, DetectionError> {
        let stream = self.facet.open_stream(&base_dir.to_string_lossy(), path)?;
        sha256_reader(stream).map_err(|source| DetectionError::Io {
            path: base_dir.join(path),
            source,
        })
    }
}
