use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{AgentConfig, ConfigError};

/// Default filename of the agent configuration.
pub const CONFIG_FILE_NAME: &str = "driftscan.toml";

/// Load and validate the configuration at `path`.
pub fn load_from_path(path: &Path) -> Result<AgentConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AgentConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&config, path)?;
    Ok(config)
}

/// Load the configuration from the agent home, returning defaults if missing.
pub fn load_or_default(home: &Path) -> Result<AgentConfig, ConfigError> {
    let path = home.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(AgentConfig::default());
    }
    load_from_path(&path)
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &AgentConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, data.as_bytes())
}

fn validate(config: &AgentConfig, path: &Path) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        path: path.to_path_buf(),
        message,
    };
    let mut resource_ids = HashSet::new();
    for resource in &config.resources {
        if !resource_ids.insert(resource.id) {
            return Err(invalid(format!("duplicate resource id {}", resource.id)));
        }
        let mut names = HashSet::new();
        for definition in &resource.definitions {
            let name = definition.name.trim();
            if name.is_empty() {
                return Err(invalid(format!(
                    "resource {} has a definition without a name",
                    resource.id
                )));
            }
            if name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(invalid(format!(
                    "definition name {name:?} on resource {} cannot be used as a directory name",
                    resource.id
                )));
            }
            if !names.insert(name.to_string()) {
                return Err(invalid(format!(
                    "resource {} defines {name:?} more than once",
                    resource.id
                )));
            }
        }
    }
    Ok(())
}

/// Write the file through a randomly named sibling and rename it into place.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    use rand::TryRngCore;
    let write_error = |path: &Path, source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().ok_or_else(|| {
        write_error(
            path,
            std::io::Error::other("config path has no parent directory"),
        )
    })?;
    let file_name = path
        .file_name()
        .ok_or_else(|| write_error(path, std::io::Error::other("config path has no file name")))?;

    let mut last_err = None;
    for _ in 0..5 {
        let mut bytes = [0u8; 6];
        rand::rngs::OsRng.try_fill_bytes(&mut bytes).map_err(|source| {
            write_error(
                path,
                std::io::Error::other(format!(
                    "failed to generate temporary file suffix: {source}"
                )),
            )
        })?;
        let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        let tmp_path: PathBuf = dir.join(format!("{}.tmp-{suffix}", file_name.to_string_lossy()));

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                last_err = Some(err);
                continue;
            }
            Err(err) => return Err(write_error(&tmp_path, err)),
        };

        if let Err(err) = file.write_all(data).and_then(|()| file.sync_all()) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(write_error(&tmp_path, err));
        }
        drop(file);
        if let Err(err) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(write_error(path, err));
        }
        return Ok(());
    }

    Err(write_error(
        path,
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!(
                "failed to create temporary file for {}: {}",
                path.display(),
                last_err
                    .as_ref()
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "unknown error".into())
            ),
        ),
    ))
}
