// Media transcoder adapter
//
// This module hides the external audio tool behind the narrow set of
// primitives the synchronization engine needs:
// - Processor: ffmpeg/ffprobe implementation of the Transcoder trait
// - Commands: Command builders and output parsers

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::sync::tempo::TempoChain;

/// Primitive media operations used by the synchronization engine.
///
/// Every operation writes to the output path chosen by the caller and fails
/// with `DubsyncError::Transcode`. Implementations never retry internally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Duration of a clip in seconds
    async fn probe_duration(&self, clip: &Path) -> Result<f64>;

    /// Copy at most `max_duration` seconds of `clip` into `output`
    async fn trim_to_max(&self, clip: &Path, max_duration: f64, output: &Path) -> Result<()>;

    /// Write exactly `duration` seconds of silence into `output`
    async fn silence(&self, duration: f64, output: &Path) -> Result<()>;

    /// Apply every factor of `chain` in order; an empty chain only re-encodes
    async fn apply_tempo_chain(&self, clip: &Path, chain: &TempoChain, output: &Path) -> Result<()>;

    /// Concatenate `clips` in order into `output`
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()>;

    /// Offset in seconds at which speech starts after leading silence
    async fn detect_speech_start(&self, audio: &Path) -> Result<f64>;

    /// Check if the underlying tool is available
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating transcoder instances
pub struct TranscoderFactory;

impl TranscoderFactory {
    /// Create the default transcoder implementation (FFmpeg-based)
    pub fn create_transcoder(config: MediaConfig) -> std::sync::Arc<dyn Transcoder> {
        std::sync::Arc::new(processor::FfmpegTranscoder::new(config))
    }
}
