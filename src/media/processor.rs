use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, DubsyncError, TranscodeOperation};
use crate::sync::tempo::TempoChain;
use super::{Transcoder, MediaCommandBuilder, concat_list, parse_probe_duration, parse_speech_start};

/// Concrete implementation of the transcoder (FFmpeg-based)
pub struct FfmpegTranscoder {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegTranscoder {
    /// Create a new ffmpeg transcoder
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(
            &config.ffmpeg_path,
            &config.ffprobe_path,
            config.sample_rate,
            config.channels,
        );

        Self {
            config,
            command_builder,
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.call_timeout_secs)
    }

    fn concat_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concat_timeout_secs)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_duration(&self, clip: &Path) -> Result<f64> {
        let output = self
            .command_builder
            .probe_duration(clip)
            .execute(self.call_timeout())
            .await?;
        let duration = parse_probe_duration(&output.stdout)?;
        debug!("Probed {}: {:.3}s", clip.display(), duration);
        Ok(duration)
    }

    async fn trim_to_max(&self, clip: &Path, max_duration: f64, output: &Path) -> Result<()> {
        self.command_builder
            .trim_to_max(clip, max_duration, output)
            .execute(self.call_timeout())
            .await?;
        Ok(())
    }

    async fn silence(&self, duration: f64, output: &Path) -> Result<()> {
        if !(duration > 0.0) {
            return Err(DubsyncError::transcode(
                TranscodeOperation::Silence,
                format!("Silence duration must be positive, got {}", duration),
            ));
        }
        self.command_builder
            .silence(duration, output)
            .execute(self.call_timeout())
            .await?;
        Ok(())
    }

    async fn apply_tempo_chain(&self, clip: &Path, chain: &TempoChain, output: &Path) -> Result<()> {
        chain.validate()?;
        self.command_builder
            .tempo(clip, &chain.to_filter(), output)
            .execute(self.call_timeout())
            .await?;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        if clips.is_empty() {
            return Err(DubsyncError::transcode(
                TranscodeOperation::Concat,
                "Nothing to concatenate",
            ));
        }

        let mut list_file = tempfile::Builder::new()
            .prefix("dubsync-concat-")
            .suffix(".txt")
            .tempfile()?;
        list_file.write_all(concat_list(clips).as_bytes())?;
        list_file.flush()?;

        info!("Concatenating {} clips into {}", clips.len(), output.display());
        self.command_builder
            .concat(list_file.path(), output)
            .execute(self.concat_timeout())
            .await?;
        Ok(())
    }

    async fn detect_speech_start(&self, audio: &Path) -> Result<f64> {
        let output = self
            .command_builder
            .detect_silence(audio, self.config.silence_noise_db, self.config.silence_min_duration)
            .execute(self.concat_timeout())
            .await?;
        let start = parse_speech_start(&output.stderr);
        debug!("Detected speech start in {} at {:.2}s", audio.display(), start);
        Ok(start)
    }

    async fn check_availability(&self) -> Result<String> {
        let output = self
            .command_builder
            .version_check()
            .execute(self.call_timeout())
            .await?;
        // The first line typically contains the version
        let version = output.stdout.lines().next().unwrap_or("Unknown version").to_string();
        info!("Media processor is available: {}", version);
        Ok(version)
    }
}
