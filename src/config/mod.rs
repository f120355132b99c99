// Configuration management for Quaver
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub music_dir: PathBuf,
    /// Order siblings most recently modified first instead of by the
    /// filesystem's natural order.
    pub sort_by_mtime: bool,
    pub queue_path: PathBuf,
    pub history_path: PathBuf,
    /// Program used to fetch remote audio. Looked up in $PATH unless it
    /// carries a path separator.
    pub downloader: String,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quaver");

        Self {
            music_dir: dirs::audio_dir().unwrap_or_else(|| PathBuf::from("~/Music")),
            sort_by_mtime: false,
            queue_path: config_dir.join("queue"),
            history_path: config_dir.join("history"),
            downloader: "yt-dlp".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("quaver");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();

        assert_eq!(back.music_dir, config.music_dir);
        assert_eq!(back.downloader, "yt-dlp");
        assert!(!back.sort_by_mtime);
    }

    #[test]
    fn partial_config_is_rejected_rather_than_guessed() {
        // Every field is required; a stale config surfaces loudly.
        assert!(toml::from_str::<Config>("downloader = \"yt-dlp\"\n").is_err());
    }
}
