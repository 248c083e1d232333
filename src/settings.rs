use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beatfinder::BeatFinderConfig;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Dummy,
    Artnet,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Frame period for timer-paced devices and for an engine without devices.
    pub tick_period_ms: u64,
    pub universe_count: usize,
    pub output: OutputKind,
    pub artnet_interface: String,
    pub artnet_broadcast: bool,
    pub artnet_unicast_ip: String,
    pub artnet_net: u8,
    pub artnet_subnet: u8,
    pub beat_finder_enabled: bool,
    pub audio_device: Option<String>,
    pub audio_block_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_period_ms: 25,
            universe_count: 1,
            output: OutputKind::Dummy,
            artnet_interface: "0.0.0.0".to_string(),
            artnet_broadcast: true,
            artnet_unicast_ip: String::new(),
            artnet_net: 0,
            artnet_subnet: 0,
            beat_finder_enabled: false,
            audio_device: None,
            audio_block_size: 1024,
        }
    }
}

impl EngineSettings {
    /// `<config dir>/stagemix/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stagemix").join("settings.json"))
    }

    /// Reads settings from `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("[settings] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)
            .map_err(|e| EngineError::Settings(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads from [`EngineSettings::default_path`], or defaults when there is
    /// no config directory.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_period_ms == 0 {
            return Err(EngineError::Settings("tick_period_ms must be positive".into()));
        }
        if self.universe_count == 0 {
            return Err(EngineError::Settings("universe_count must be positive".into()));
        }
        if self.artnet_net > 0x7F || self.artnet_subnet > 0x0F {
            return Err(EngineError::Settings(format!(
                "art-net net {} / subnet {} out of range",
                self.artnet_net, self.artnet_subnet
            )));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    pub fn beat_finder_config(&self) -> BeatFinderConfig {
        BeatFinderConfig {
            device_name: self.audio_device.clone(),
            block_size: self.audio_block_size,
            ..BeatFinderConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = EngineSettings::load(&dir.path().join("absent.json")).expect("defaults");
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "output": "artnet", "artnet_net": 3 }"#).expect("write");

        let settings = EngineSettings::load(&path).expect("valid");
        assert_eq!(settings.output, OutputKind::Artnet);
        assert_eq!(settings.artnet_net, 3);
        assert_eq!(settings.tick_period_ms, 25);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("settings.json");
        let settings = EngineSettings {
            universe_count: 4,
            audio_device: Some("loopback".into()),
            ..EngineSettings::default()
        };
        settings.save(&path).expect("writable");
        assert_eq!(EngineSettings::load(&path).expect("readable"), settings);
    }

    #[test]
    fn rejects_bad_values() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "tick_period_ms": 0 }"#).expect("write");
        assert!(matches!(
            EngineSettings::load(&path),
            Err(EngineError::Settings(_))
        ));

        fs::write(&path, "not json").expect("write");
        assert!(matches!(
            EngineSettings::load(&path),
            Err(EngineError::Settings(_))
        ));
    }
}
