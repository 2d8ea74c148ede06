//! Library exports for the agent binary, integration tests and benchmarks.
/// Agent home directory helpers.
pub mod app_dirs;
/// Changeset data model and storage.
pub mod changeset;
/// Agent configuration loading and saving.
pub mod config;
/// Drift detection strategies and the snapshot/delta generator.
pub mod detect;
/// Capability interface for resources that report their own files.
pub mod facet;
/// Global tracing setup.
pub mod logging;
/// Packaging of changed file content for upload.
pub mod sender;
