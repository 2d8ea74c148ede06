//! Drift detection: scan strategies and the snapshot/delta generator.
//!
//! A cycle lists the files under a definition's base directory, classifies
//! them against the last coverage snapshot (or the pinned baseline) and
//! writes the next snapshot plus a delta changeset when anything drifted.
//! Listing, status and hashing go through a [`DetectionStrategy`] so the same
//! generator serves plain directories and resources that expose a facet.

mod classify;
mod detector;
mod errors;
mod facet_strategy;
mod filesystem;
mod filter;
mod generator;
mod hash;
mod locator;
mod strategy;
mod summary;


pub use classify::{Classification, FileProbe, classify};
pub use detector::{DriftDetector, strategy_for};
pub use errors::DetectionError;
pub use facet_strategy::FacetStrategy;
pub use filesystem::FileSystemStrategy;
pub use filter::PathFilter;
pub use generator::SnapshotGenerator;
pub use hash::{sha256_file, sha256_reader};
pub use locator::{ResourceLocator, StaticResourceLocator};
pub use strategy::{DetectionStrategy, FileListing};
pub use summary::DetectionSummary;
