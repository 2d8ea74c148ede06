//! Agent configuration: drift definitions, the resources they run against and
//! agent-wide settings, stored as TOML.

mod errors;
mod io;
mod types;

pub use errors::ConfigError;
pub use io::{CONFIG_FILE_NAME, load_from_path, load_or_default, save_to_path};
pub use types::{
    AgentConfig, AgentSettings, DriftDefinition, DriftDetectionSchedule, Filter, ResourceConfig,
};
