use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{RenderRect, TimeRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fps: f64,
    /// Elements per chunk when operators fan work out over the worker pool.
    pub parallel_chunk_size: usize,
    /// Run one-shot plans in a background task. Time-step and render plans
    /// always run inline.
    pub background_one_shot: bool,
    pub log_level: String,

    // Tables last so TOML output stays valid.
    pub time_range: TimeRange,
    pub render_rect: RenderRect,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: 24.0,
            parallel_chunk_size: 4096,
            background_one_shot: true,
            log_level: "info".to_string(),
            time_range: TimeRange::default(),
            render_rect: RenderRect {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
        }
    }
}

impl EngineConfig {
    /// Loads from `path`, format chosen by extension. A missing or invalid
    /// file yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), %err, "Invalid engine config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        common::serde::load_file(path)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        common::serde::save_file(self, path)
    }
}

#[cfg(test)]
mod tests {
    use common::{SerdeFormat, deserialize, serialize};

    use super::*;

    #[test]
    fn roundtrip_all_formats() -> anyhow::Result<()> {
        let config = EngineConfig {
            fps: 30.0,
            parallel_chunk_size: 64,
            background_one_shot: false,
            ..EngineConfig::default()
        };

        for format in SerdeFormat::all_formats_for_testing() {
            let text = serialize(&config, format)?;
            let restored: EngineConfig = deserialize(&text, format)?;
            assert_eq!(restored, config);
        }

        Ok(())
    }

    #[test]
    fn partial_toml_fills_defaults() -> anyhow::Result<()> {
        let config: EngineConfig = deserialize("fps = 60.0\n", SerdeFormat::Toml)?;

        assert_eq!(config.fps, 60.0);
        assert_eq!(config.time_range, TimeRange::default());
        assert!(config.background_one_shot);

        Ok(())
    }

    #[test]
    fn missing_or_broken_file_falls_back() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("engine_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;

        let missing = dir.join("missing.toml");
        assert_eq!(EngineConfig::load_or_default(&missing), EngineConfig::default());

        let broken = dir.join("broken.toml");
        std::fs::write(&broken, "fps = [")?;
        assert_eq!(EngineConfig::load_or_default(&broken), EngineConfig::default());

        let saved = dir.join("engine.toml");
        let config = EngineConfig {
            fps: 12.0,
            ..EngineConfig::default()
        };
        config.save(&saved)?;
        assert_eq!(EngineConfig::load_or_default(&saved), config);

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
