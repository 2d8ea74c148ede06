use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::facet::DEFAULT_LOCK_TIMEOUT;

/// Include or exclude rule applied to paths under a definition's base directory.
///
/// `path` names a directory relative to the base directory (empty means the
/// base directory itself); `pattern` is an optional gitignore-style glob
/// matched against the remainder of the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Filter {
    pub fn new(path: impl Into<String>, pattern: Option<&str>) -> Self {
        Self {
            path: path.into(),
            pattern: pattern.map(str::to_string),
        }
    }
}

/// What to track for a resource and how to compare it across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftDefinition {
    pub id: i32,
    pub name: String,
    /// Directory to scan, relative to the resource root unless absolute.
    pub base_dir: PathBuf,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub includes: Vec<Filter>,
    #[serde(default)]
    pub excludes: Vec<Filter>,
    /// Detection cadence hint for the scheduler; not interpreted by the engine.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl DriftDefinition {
    pub fn new(id: i32, name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            base_dir: base_dir.into(),
            pinned: false,
            enabled: true,
            includes: Vec::new(),
            excludes: Vec::new(),
            interval_secs: default_interval_secs(),
        }
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn include(mut self, filter: Filter) -> Self {
        self.includes.push(filter);
        self
    }

    pub fn exclude(mut self, filter: Filter) -> Self {
        self.excludes.push(filter);
        self
    }
}

/// A definition bound to the resource it runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftDetectionSchedule {
    pub resource_id: i32,
    pub definition: DriftDefinition,
    /// Epoch millis before which the scheduler should not run this schedule.
    pub next_scan: i64,
}

impl DriftDetectionSchedule {
    pub fn new(resource_id: i32, definition: DriftDefinition) -> Self {
        Self {
            resource_id,
            definition,
            next_scan: 0,
        }
    }

    /// Push `next_scan` one interval past now.
    pub fn update_next_scan(&mut self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let interval = (self.definition.interval_secs as i64).saturating_mul(1000);
        self.next_scan = now.saturating_add(interval);
    }
}

impl std::fmt::Display for DriftDetectionSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DriftDetectionSchedule[resourceId: {}, driftDefinitionId: {}, driftDefinitionName: {}]",
            self.resource_id, self.definition.id, self.definition.name
        )
    }
}

/// Agent-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Optional override for the agent home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Bound on waiting for a resource lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Package and hand off new content after each drift.
    #[serde(default = "default_true")]
    pub send_content: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            send_content: true,
        }
    }
}

/// A managed resource with a filesystem root and its definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub id: i32,
    pub root: PathBuf,
    #[serde(default)]
    pub definitions: Vec<DriftDefinition>,
}

/// Contents of `driftscan.toml`.
///
/// Config keys (TOML): `agent` (`data_dir`, `lock_timeout_ms`, `send_content`)
/// and `resources` (`id`, `root`, `definitions`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl AgentConfig {
    /// Schedules for every enabled definition, in file order.
    pub fn schedules(&self) -> Vec<DriftDetectionSchedule> {
        self.resources
            .iter()
            .flat_map(|resource| {
                resource
                    .definitions
                    .iter()
                    .filter(|definition| definition.enabled)
                    .map(|definition| {
                        DriftDetectionSchedule::new(resource.id, definition.clone())
                    })
            })
            .collect()
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    1800
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_millis() as u64
}
