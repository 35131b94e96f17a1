use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{HardsubError, Result};
use crate::matcher::DEFAULT_THRESHOLD;
use crate::options::{Crf, EncodeOptions, OutputLocation, SpeedPreset, SubtitleStyle};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "hardsub.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub toolchain: ToolchainConfig,
    pub matching: MatchingConfig,
    pub encode: EncodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to the ffprobe binary used for duration probing
    pub ffprobe_path: String,
    /// Seconds to wait for a duration probe before giving up
    pub probe_timeout_secs: u64,
    /// Video codec used for the re-encode; audio is always copied
    pub video_codec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum similarity (exclusive) for a subtitle to be paired
    pub threshold: f64,
    /// Recognized video extensions, without the dot
    pub video_extensions: Vec<String>,
    /// Recognized subtitle extensions, without the dot
    pub subtitle_extensions: Vec<String>,
}

/// Defaults for a batch run, also where `--remember` stores the last used values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub preset: SpeedPreset,
    pub crf: Option<Crf>,
    pub output_extension: String,
    pub style: SubtitleStyle,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            probe_timeout_secs: 30,
            video_codec: "libx264".to_string(),
        }
    }
}

impl ToolchainConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            video_extensions: ["mp4", "mkv", "mov", "avi", "wmv", "flv", "webm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            subtitle_extensions: ["srt", "vtt", "ass", "ssa"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            preset: SpeedPreset::default(),
            crf: None,
            output_extension: "mp4".to_string(),
            style: SubtitleStyle::default(),
        }
    }
}

impl EncodeConfig {
    /// Batch options from these defaults plus the run's output location
    pub fn to_options(&self, output: OutputLocation) -> EncodeOptions {
        EncodeOptions {
            preset: self.preset,
            crf: self.crf,
            style: self.style.clone(),
            output,
            output_extension: self.output_extension.clone(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HardsubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| HardsubError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path, then `hardsub.toml` in the working directory, then defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Config::from_file(path),
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                    Config::from_file(DEFAULT_CONFIG_FILE)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HardsubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| HardsubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            return Err(HardsubError::Config(format!(
                "matching.threshold must be within 0.0 and 1.0, got {}",
                self.matching.threshold
            )));
        }
        if self.toolchain.probe_timeout_secs == 0 {
            return Err(HardsubError::Config("toolchain.probe_timeout_secs must be positive".to_string()));
        }
        if self.matching.video_extensions.is_empty() {
            return Err(HardsubError::Config("matching.video_extensions is empty".to_string()));
        }
        self.encode
            .style
            .validate()
            .map_err(|e| HardsubError::Config(format!("encode.style: {}", e)))?;
        Ok(())
    }
}
