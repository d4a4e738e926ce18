//! In-memory transcoder used by the integration tests.
//!
//! Clip durations live in a map keyed by path. Every operation derives the
//! duration of its output from its inputs, so the engine can be exercised
//! end to end without ffmpeg. Only concat outputs are written to disk,
//! because the final track is renamed into place.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dubsync::config::{Config, EngineConfig, SyncPolicy};
use dubsync::error::{DubsyncError, Result, TranscodeOperation};
use dubsync::media::Transcoder;
use dubsync::segment::{SourceSegment, SynthesizedClip};
use dubsync::sync::{SyncEngine, SyncRequest, TempoChain};

#[derive(Default)]
pub struct FakeTranscoder {
    durations: Mutex<HashMap<PathBuf, f64>>,
    tempo_chains: Mutex<Vec<Vec<f64>>>,
    silences: Mutex<Vec<f64>>,
    failing_tempo_inputs: Mutex<HashSet<PathBuf>>,
    final_concat_failures: Mutex<usize>,
    speech_start: Mutex<Option<f64>>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip<P: Into<PathBuf>>(self, path: P, duration: f64) -> Self {
        self.durations.lock().unwrap().insert(path.into(), duration);
        self
    }

    pub fn fail_tempo_for<P: Into<PathBuf>>(self, path: P) -> Self {
        self.failing_tempo_inputs.lock().unwrap().insert(path.into());
        self
    }

    /// Fail the next `times` concats into a hidden partial track
    pub fn fail_final_concat(self, times: usize) -> Self {
        *self.final_concat_failures.lock().unwrap() = times;
        self
    }

    pub fn with_speech_start(self, start: f64) -> Self {
        *self.speech_start.lock().unwrap() = Some(start);
        self
    }

    pub fn tempo_chains(&self) -> Vec<Vec<f64>> {
        self.tempo_chains.lock().unwrap().clone()
    }

    pub fn silences(&self) -> Vec<f64> {
        self.silences.lock().unwrap().clone()
    }

    fn duration_of(&self, path: &Path, operation: TranscodeOperation) -> Result<f64> {
        self.durations
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or_else(|| DubsyncError::transcode(operation, format!("{}: no such file", path.display())))
    }

    fn record(&self, path: &Path, duration: f64) {
        self.durations.lock().unwrap().insert(path.to_path_buf(), duration);
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn probe_duration(&self, clip: &Path) -> Result<f64> {
        self.duration_of(clip, TranscodeOperation::Probe)
    }

    async fn trim_to_max(&self, clip: &Path, max_duration: f64, output: &Path) -> Result<()> {
        let duration = self.duration_of(clip, TranscodeOperation::Trim)?;
        self.record(output, duration.min(max_duration));
        Ok(())
    }

    async fn silence(&self, duration: f64, output: &Path) -> Result<()> {
        if !(duration > 0.0) {
            return Err(DubsyncError::transcode(
                TranscodeOperation::Silence,
                format!("invalid duration {}", duration),
            ));
        }
        self.silences.lock().unwrap().push(duration);
        self.record(output, duration);
        Ok(())
    }

    async fn apply_tempo_chain(&self, clip: &Path, chain: &TempoChain, output: &Path) -> Result<()> {
        chain.validate()?;
        self.tempo_chains.lock().unwrap().push(chain.factors().to_vec());
        if self.failing_tempo_inputs.lock().unwrap().contains(clip) {
            return Err(DubsyncError::transcode(TranscodeOperation::Tempo, "filter graph failed"));
        }
        let duration = self.duration_of(clip, TranscodeOperation::Tempo)?;
        self.record(output, duration / chain.product());
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        let is_final = output
            .file_name()
            .map(|name| name.to_string_lossy().contains(".partial"))
            .unwrap_or(false);
        if is_final {
            let mut remaining = self.final_concat_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DubsyncError::transcode(TranscodeOperation::Concat, "muxer error"));
            }
        }

        let mut total = 0.0;
        for clip in clips {
            total += self.duration_of(clip, TranscodeOperation::Concat)?;
        }
        std::fs::write(output, b"")?;
        self.record(output, total);
        Ok(())
    }

    async fn detect_speech_start(&self, _audio: &Path) -> Result<f64> {
        Ok(self.speech_start.lock().unwrap().unwrap_or(0.0))
    }

    async fn check_availability(&self) -> Result<String> {
        Ok("fake transcoder".to_string())
    }
}

pub fn engine_config(scratch: &Path) -> EngineConfig {
    EngineConfig {
        workers: 2,
        scratch_dir: Some(scratch.to_path_buf()),
        keep_scratch: false,
        show_progress: false,
    }
}

pub fn config(scratch: &Path, policy: SyncPolicy) -> Config {
    Config {
        sync: policy,
        engine: engine_config(scratch),
        ..Config::default()
    }
}

pub fn engine(transcoder: std::sync::Arc<FakeTranscoder>, policy: SyncPolicy, scratch: &Path) -> SyncEngine {
    SyncEngine::new(transcoder, policy, engine_config(scratch)).unwrap()
}

pub fn segment(index: usize, start: f64, end: f64) -> SourceSegment {
    SourceSegment::new(index, start, end, format!("segment {}", index))
}

pub fn clip_path(index: usize) -> PathBuf {
    PathBuf::from(format!("/tts/clip_{}.wav", index))
}

pub fn clip(index: usize, natural_duration: f64) -> SynthesizedClip {
    SynthesizedClip {
        segment_index: index,
        natural_duration,
        media_ref: clip_path(index),
    }
}

pub fn request(
    segments: Vec<SourceSegment>,
    clips: Vec<SynthesizedClip>,
    total_duration: f64,
    output: &Path,
) -> SyncRequest {
    SyncRequest {
        segments,
        clips,
        failures: Vec::new(),
        total_duration,
        speech_start_hint: None,
        output_path: output.to_path_buf(),
    }
}
