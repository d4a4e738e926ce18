use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, DubsyncError};
use crate::media::Transcoder;
use crate::segment::{SourceSegment, SynthesizedClip};
use crate::sync::SyncRequest;

/// Synthesizer output for one segment as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestClip {
    pub segment_index: usize,
    /// Probed when missing
    pub natural_duration: Option<f64>,
    pub media_ref: PathBuf,
}

/// Explicit synthesis failure reported by the synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFailure {
    pub segment_index: usize,
    pub reason: String,
}

/// On-disk description of one synchronization job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobManifest {
    pub total_duration: f64,
    #[serde(default)]
    pub speech_start_hint: Option<f64>,
    /// Original audio, used to detect leading silence when no hint is given
    #[serde(default)]
    pub original_audio: Option<PathBuf>,
    pub segments: Vec<SourceSegment>,
    #[serde(default)]
    pub clips: Vec<ManifestClip>,
    #[serde(default)]
    pub failures: Vec<ManifestFailure>,
}

impl JobManifest {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DubsyncError::FileNotFound(path.display().to_string()));
        }
        let content = tokio::fs::read_to_string(path).await?;
        let mut manifest: JobManifest = serde_json::from_str(&content)?;

        // Relative media paths are relative to the manifest itself
        if let Some(base) = path.parent() {
            for clip in &mut manifest.clips {
                if clip.media_ref.is_relative() {
                    clip.media_ref = base.join(&clip.media_ref);
                }
            }
            manifest.original_audio = manifest.original_audio.take().map(|audio| {
                if audio.is_relative() { base.join(audio) } else { audio }
            });
        }
        debug!(
            "Loaded manifest {} with {} segments and {} clips",
            path.display(),
            manifest.segments.len(),
            manifest.clips.len()
        );
        Ok(manifest)
    }

    /// Resolve missing durations and the speech start hint, producing an engine request.
    ///
    /// A clip whose duration cannot be probed is handed over as a synthesis failure.
    pub async fn into_request(self, transcoder: &dyn Transcoder, output_path: PathBuf) -> Result<SyncRequest> {
        let mut clips = Vec::with_capacity(self.clips.len());
        let mut failures: Vec<(usize, String)> = self
            .failures
            .into_iter()
            .map(|f| (f.segment_index, f.reason))
            .collect();

        for clip in self.clips {
            let natural_duration = match clip.natural_duration {
                Some(duration) => duration,
                None => match transcoder.probe_duration(&clip.media_ref).await {
                    Ok(duration) => duration,
                    Err(e) => {
                        failures.push((clip.segment_index, format!("unreadable clip: {}", e)));
                        continue;
                    }
                },
            };
            clips.push(SynthesizedClip {
                segment_index: clip.segment_index,
                natural_duration,
                media_ref: clip.media_ref,
            });
        }

        let speech_start_hint = match (self.speech_start_hint, &self.original_audio) {
            (Some(hint), _) => Some(hint),
            (None, Some(audio)) => match transcoder.detect_speech_start(audio).await {
                Ok(start) => {
                    info!("Detected speech start at {:.2}s in {}", start, audio.display());
                    Some(start)
                }
                Err(e) => {
                    warn!("Failed to detect speech start: {}", e);
                    None
                }
            },
            (None, None) => None,
        };

        Ok(SyncRequest {
            segments: self.segments,
            clips,
            failures,
            total_duration: self.total_duration,
            speech_start_hint,
            output_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscodeOperation;
    use crate::media::MockTranscoder;
    use assert_fs::prelude::*;

    const MANIFEST: &str = r#"{
        "total_duration": 30.0,
        "original_audio": "original.wav",
        "segments": [
            {"index": 0, "start": 0.0, "end": 5.0, "text": "hello"},
            {"index": 1, "start": 7.0, "end": 10.0, "text": "world"}
        ],
        "clips": [
            {"segment_index": 0, "natural_duration": 4.6, "media_ref": "tts/0.wav"},
            {"segment_index": 1, "media_ref": "/abs/1.wav"}
        ],
        "failures": []
    }"#;

    #[tokio::test]
    async fn test_manifest_resolves_relative_paths() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("job.json");
        file.write_str(MANIFEST).unwrap();

        let manifest = JobManifest::from_file(file.path()).await.unwrap();
        assert_eq!(manifest.clips[0].media_ref, temp.path().join("tts/0.wav"));
        assert_eq!(manifest.clips[1].media_ref, PathBuf::from("/abs/1.wav"));
        assert_eq!(manifest.original_audio, Some(temp.path().join("original.wav")));
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let result = JobManifest::from_file("/nonexistent/job.json").await;
        assert!(matches!(result, Err(DubsyncError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_into_request_probes_and_detects() {
        let manifest: JobManifest = serde_json::from_str(MANIFEST).unwrap();

        let mut mock = MockTranscoder::new();
        mock.expect_probe_duration()
            .withf(|path| path.ends_with("1.wav"))
            .times(1)
            .returning(|_| Ok(3.2));
        mock.expect_detect_speech_start().times(1).returning(|_| Ok(1.5));

        let request = manifest.into_request(&mock, PathBuf::from("out.wav")).await.unwrap();
        assert_eq!(request.clips.len(), 2);
        assert_eq!(request.clips[1].natural_duration, 3.2);
        assert_eq!(request.speech_start_hint, Some(1.5));
        assert!(request.failures.is_empty());
    }

    #[tokio::test]
    async fn test_unprobeable_clip_becomes_failure() {
        let manifest: JobManifest = serde_json::from_str(MANIFEST).unwrap();

        let mut mock = MockTranscoder::new();
        mock.expect_probe_duration()
            .returning(|_| Err(DubsyncError::transcode(TranscodeOperation::Probe, "no such file")));
        mock.expect_detect_speech_start()
            .returning(|_| Err(DubsyncError::transcode(TranscodeOperation::SilenceDetect, "crash")));

        let request = manifest.into_request(&mock, PathBuf::from("out.wav")).await.unwrap();
        assert_eq!(request.clips.len(), 1);
        assert_eq!(request.failures.len(), 1);
        assert_eq!(request.failures[0].0, 1);
        assert_eq!(request.speech_start_hint, None);
    }
}
