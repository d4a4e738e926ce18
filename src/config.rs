use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, DubsyncError};

// Default values for keys that may be omitted from the config file
fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u32 {
    2
}

fn default_duration_epsilon() -> f64 {
    0.010
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub sync: SyncPolicy,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Sample rate of every intermediate and final clip
    pub sample_rate: u32,
    /// Channel count of every intermediate and final clip
    pub channels: u32,
    /// Timeout for a single per-segment transcoder call (seconds)
    pub call_timeout_secs: u64,
    /// Timeout for the final concatenation (seconds)
    pub concat_timeout_secs: u64,
    /// Noise floor used by leading silence detection (dB)
    pub silence_noise_db: f64,
    /// Minimum silence length recognised by leading silence detection (seconds)
    pub silence_min_duration: f64,
}

/// Distortion ceilings and tolerances applied by the duration normalizer.
///
/// Older call sites capped speed-up at 1.3x while newer ones chained tempo
/// filters without limit; the choice is made per deployment through this
/// struct (see [`SyncPolicy::legacy`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Relative mismatch under which no tempo change is applied
    pub tolerance_ratio: f64,
    /// Maximum total speed-up factor; `None` means uncapped
    pub max_speedup_ratio: Option<f64>,
    /// Maximum total slow-down factor; `1.0` pads short clips instead of stretching
    pub max_slowdown_ratio: Option<f64>,
    /// How much earlier than the detected speech start the first segment may begin
    pub leading_silence_tolerance: f64,
    /// Allowed deviation of the final track from its expected duration
    pub duration_epsilon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of concurrent per-segment normalizations
    pub workers: usize,
    /// Parent directory for per-job scratch directories (system temp if unset)
    pub scratch_dir: Option<PathBuf>,
    /// Keep intermediate clips after the job finishes
    pub keep_scratch: bool,
    /// Render a progress bar while segments are normalized
    pub show_progress: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            call_timeout_secs: 60,
            concat_timeout_secs: 300,
            silence_noise_db: -30.0,
            silence_min_duration: 0.5,
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            tolerance_ratio: 0.05,
            max_speedup_ratio: None,
            max_slowdown_ratio: Some(1.0),
            leading_silence_tolerance: 0.5,
            duration_epsilon: default_duration_epsilon(),
        }
    }
}

impl SyncPolicy {
    /// Preset matching the legacy call sites that limit speed-up to 1.3x
    pub fn legacy() -> Self {
        Self {
            max_speedup_ratio: Some(1.3),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.tolerance_ratio) {
            return Err(DubsyncError::Config(format!(
                "tolerance_ratio must be in [0, 1), got {}",
                self.tolerance_ratio
            )));
        }
        for (name, value) in [
            ("max_speedup_ratio", self.max_speedup_ratio),
            ("max_slowdown_ratio", self.max_slowdown_ratio),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value < 1.0 {
                    return Err(DubsyncError::Config(format!(
                        "{} must be a finite value >= 1.0, got {}",
                        name, value
                    )));
                }
            }
        }
        if self.leading_silence_tolerance < 0.0 || self.duration_epsilon < 0.0 {
            return Err(DubsyncError::Config(
                "leading_silence_tolerance and duration_epsilon must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            scratch_dir: None,
            keep_scratch: false,
            show_progress: true,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DubsyncError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| DubsyncError::Config(format!("Failed to parse config file: {}", e)))?;
        config.sync.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DubsyncError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DubsyncError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dubsync.toml");

        let mut config = Config::default();
        config.sync = SyncPolicy::legacy();
        config.engine.workers = 3;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.sync, SyncPolicy::legacy());
        assert_eq!(loaded.engine.workers, 3);
        assert_eq!(loaded.media.sample_rate, 44100);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[media]\nffmpeg_path = \"/opt/ffmpeg\"\n\n[sync]\ntolerance_ratio = 0.1\nmax_speedup_ratio = 1.5\n\n[engine]\nworkers = 3\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.sync.tolerance_ratio, 0.1);
        assert_eq!(config.sync.max_speedup_ratio, Some(1.5));
        assert_eq!(config.sync.max_slowdown_ratio, Some(1.0));
        assert_eq!(config.sync.leading_silence_tolerance, 0.5);
        assert_eq!(config.sync.duration_epsilon, 0.010);
        assert_eq!(config.media.ffmpeg_path, "/opt/ffmpeg");
        assert_eq!(config.media.ffprobe_path, "ffprobe");
        assert_eq!(config.media.call_timeout_secs, 60);
        assert_eq!(config.engine.workers, 3);
        assert!(config.engine.show_progress);
        assert!(!config.engine.keep_scratch);
    }

    #[test]
    fn test_policy_rejects_ceiling_below_one() {
        let policy = SyncPolicy {
            max_speedup_ratio: Some(0.8),
            ..SyncPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(DubsyncError::Config(_))));
        assert!(SyncPolicy::default().validate().is_ok());
        assert!(SyncPolicy::legacy().validate().is_ok());
    }
}
