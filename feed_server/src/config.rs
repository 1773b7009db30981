use std::{
    env, fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bevy::prelude::Resource;
use feed_proto::RleMode;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_SERVER_CONFIG: &str = include_str!("data/server_config.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub tick_interval_ms: u64,
    /// Encode every update with this layout instead of measuring.
    pub forced_mode: Option<RleMode>,
    /// Frames a connection may have queued before it is dropped as too slow.
    pub write_queue_frames: usize,
    pub demo: DemoConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 41100)),
            tick_interval_ms: 100,
            forced_mode: None,
            write_queue_frames: 256,
            demo: DemoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub enabled: bool,
    pub seed: u64,
    pub monsters: u8,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: 1297,
            monsters: 6,
        }
    }
}

impl ServerConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_SERVER_CONFIG)
                .expect("builtin server config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ServerConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = ServerConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("failed to parse server config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read server config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Resource, Debug, Clone)]
pub struct ServerConfigHandle(pub Arc<ServerConfig>);

impl ServerConfigHandle {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.0)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.0
    }
}

#[derive(Resource, Debug, Clone)]
pub struct ServerConfigMetadata {
    path: Option<PathBuf>,
}

impl ServerConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load the config named by `FEED_SERVER_CONFIG_PATH`, falling back to the
/// builtin one when the file is missing or invalid.
pub fn load_server_config_from_env() -> (Arc<ServerConfig>, ServerConfigMetadata) {
    if let Some(path) = env::var("FEED_SERVER_CONFIG_PATH").ok().map(PathBuf::from) {
        match ServerConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "tile_feed::config",
                    path = %path.display(),
                    "server_config.loaded=file"
                );
                return (Arc::new(config), ServerConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "tile_feed::config",
                    path = %path.display(),
                    error = %err,
                    "server_config.load_failed"
                );
            }
        }
    }

    let config = ServerConfig::builtin();
    tracing::info!(target: "tile_feed::config", "server_config.loaded=builtin");
    (config, ServerConfigMetadata::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = ServerConfig::builtin();
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert!(config.forced_mode.is_none());
        assert_eq!(config.write_queue_frames, 256);
        assert!(config.demo.enabled);
    }

    #[test]
    fn forced_mode_reads_lowercase_names() {
        let config = ServerConfig::from_json_str(r#"{ "forced_mode": "classic" }"#).unwrap();
        assert_eq!(config.forced_mode, Some(RleMode::Classic));
        assert_eq!(config.bind, ServerConfig::default().bind);
    }

    #[test]
    fn missing_file_reports_read_failure() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/feed.json")).unwrap_err();
        assert!(matches!(err, ServerConfigError::ReadFailed { .. }));
    }
}
