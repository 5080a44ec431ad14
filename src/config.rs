use std::path::PathBuf;

use config::{Config, ConfigError};
use serde::Deserialize;

use crate::solo::DEFAULT_PORT;

/// Which media framework realizes the pipeline.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Lifecycle only: binds the UDP port, processes no media.
    Software,
    Gstreamer,
}

impl Default for EngineKind {
    fn default() -> Self {
        if cfg!(feature = "gstreamer") {
            EngineKind::Gstreamer
        } else {
            EngineKind::Software
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bus_capacity() -> usize {
    256
}

#[derive(Debug, Deserialize)]
pub struct SoloVideoConfig {
    /// UDP port the drone streams to.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub engine: EngineKind,

    /// How many undelivered bus events may queue up before the engine blocks.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for SoloVideoConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            engine: EngineKind::default(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl SoloVideoConfig {
    /// Reads the optional config file, then lets `SOLO_VIDEO_*` environment
    /// variables override it.
    pub fn read(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut c = Config::new();

        if let Some(path) = path {
            c.merge(config::File::from(path))?;
        }
        c.merge(config::Environment::with_prefix("SOLO_VIDEO"))?;

        let config: Self = c.try_into()?;

        if config.bus_capacity == 0 {
            return Err(ConfigError::Message(
                "bus_capacity must be at least 1".to_owned(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_file_over_defaults() {
        let path = std::env::temp_dir().join(format!("solo-video-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 5601\nengine = \"software\"\n").unwrap();

        let config = SoloVideoConfig::read(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 5601);
        assert_eq!(config.engine, EngineKind::Software);
        assert_eq!(config.bus_capacity, 256);
    }

    #[test]
    fn zero_bus_capacity_is_rejected() {
        let path = std::env::temp_dir().join(format!("solo-video-zero-{}.toml", std::process::id()));
        std::fs::write(&path, "bus_capacity = 0\n").unwrap();

        let result = SoloVideoConfig::read(Some(path.clone()));
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("solo-video-does-not-exist.toml");
        assert!(SoloVideoConfig::read(Some(path)).is_err());
    }

    #[test]
    fn defaults_match_the_drone() {
        let config = SoloVideoConfig::default();
        assert_eq!(config.port, 5600);
        assert_eq!(config.bus_capacity, 256);
    }
}
