//! Locating and loading the configuration file.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::info;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Load the client configuration.
///
/// Reads `path` if given, otherwise `config.toml` under [`config_dir`]. A
/// missing file yields the defaults; an unreadable or invalid one is an error.
pub fn load_config(path: Option<&str>) -> Result<ClientConfig, ClientError> {
    let config_path = path.map_or_else(default_config_path, PathBuf::from);

    let content = match std::fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %config_path.display(), "no config file, using defaults");
            return Ok(ClientConfig::default());
        }
        Err(e) => {
            return Err(ClientError::Config(format!(
                "cannot read {}: {e}",
                config_path.display()
            )))
        }
    };
    let config: ClientConfig = toml::from_str(&content).map_err(|e| {
        ClientError::Config(format!("cannot parse {}: {e}", config_path.display()))
    })?;
    info!(path = %config_path.display(), "loaded config");
    Ok(config)
}

/// Directory holding the client's configuration.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("distributed-input")
}

fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
