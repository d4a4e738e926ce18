use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Result, DubsyncError};
use crate::manifest::JobManifest;
use crate::media::{Transcoder, TranscoderFactory};
use crate::subtitle::{generate_srt, placed_segments};
use crate::sync::normalizer::{self, NormalizationPlan};
use crate::sync::{CancellationToken, SlotPlanner, SyncEngine, SyncOutcome, SyncWarning};

/// JSON report written next to a synchronized track
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub manifest: PathBuf,
    pub finished_at: DateTime<Utc>,
    pub total_duration: f64,
    /// Seconds by which the track outgrew the source timeline
    pub excess: f64,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// One row of a dry-run plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedSegment {
    pub segment_index: usize,
    pub window_start: f64,
    pub window_end: f64,
    pub gap_before: f64,
    pub natural_duration: Option<f64>,
    pub decision: String,
    pub tempo_factors: Vec<f64>,
    pub expected_overflow: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPlan {
    pub segments: Vec<PlannedSegment>,
    pub warnings: Vec<SyncWarning>,
    pub expected_overflow: f64,
}

pub struct Workflow {
    config: Config,
    transcoder: Arc<dyn Transcoder>,
    engine: SyncEngine,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let transcoder = TranscoderFactory::create_transcoder(config.media.clone());
        Self::with_transcoder(config, transcoder)
    }

    pub fn with_transcoder(config: Config, transcoder: Arc<dyn Transcoder>) -> Result<Self> {
        let engine = SyncEngine::new(transcoder.clone(), config.sync.clone(), config.engine.clone())?;
        Ok(Self {
            config,
            transcoder,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check that the transcoder binaries can be run
    pub async fn check(&self) -> Result<String> {
        let version = self.transcoder.check_availability().await?;
        info!("Transcoder available: {}", version);
        Ok(version)
    }

    /// Synchronize one manifest into `output`, optionally writing subtitles and a report
    pub async fn synchronize_job<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        manifest_path: P,
        output: Q,
        srt_path: Option<&Path>,
        report_path: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let manifest_path = manifest_path.as_ref();
        let output = output.as_ref();
        info!("Synchronizing job: {}", manifest_path.display());

        let manifest = JobManifest::from_file(manifest_path).await?;
        let total_duration = manifest.total_duration;
        let request = manifest
            .into_request(self.transcoder.as_ref(), output.to_path_buf())
            .await?;

        let outcome = self.engine.synchronize(request, cancel).await?;
        for warning in &outcome.warnings {
            warn!("{}", warning);
        }

        if let Some(srt_path) = srt_path {
            generate_srt(&placed_segments(&outcome), srt_path).await?;
        }

        if let Some(report_path) = report_path {
            let report = JobReport {
                job_id: Uuid::new_v4(),
                manifest: manifest_path.to_path_buf(),
                finished_at: Utc::now(),
                total_duration,
                excess: outcome.excess(total_duration),
                outcome: outcome.clone(),
            };
            fs::write(report_path, serde_json::to_string_pretty(&report)?).await?;
            info!("Report written to {}", report_path.display());
        }

        Ok(outcome)
    }

    /// Synchronize every `*.json` manifest found under `input_dir`.
    ///
    /// Each job writes `<stem>.wav`, `<stem>.srt` and `<stem>.report.json`
    /// into `output_dir`. Returns the number of jobs that succeeded.
    pub async fn process_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_dir: P,
        output_dir: Option<Q>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let input_dir = input_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(DubsyncError::Config("Input path is not a directory".to_string()));
        }

        let output_dir = match output_dir {
            Some(dir) => dir.as_ref().to_path_buf(),
            None => input_dir.to_path_buf(),
        };
        fs::create_dir_all(&output_dir).await?;

        let mut manifests = Vec::new();
        for entry in WalkDir::new(input_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_manifest = path.extension().and_then(|e| e.to_str()) == Some("json")
                && !path.to_string_lossy().ends_with(".report.json");
            if entry.file_type().is_file() && is_manifest {
                manifests.push(path.to_path_buf());
            }
        }
        manifests.sort();

        info!("Found {} manifests to process", manifests.len());

        let mut succeeded = 0;
        for manifest in manifests {
            let stem = manifest
                .file_stem()
                .ok_or_else(|| DubsyncError::Config("Invalid manifest filename".to_string()))?
                .to_string_lossy()
                .to_string();
            let output = output_dir.join(format!("{}.wav", stem));
            let srt = output_dir.join(format!("{}.srt", stem));
            let report = output_dir.join(format!("{}.report.json", stem));

            match self
                .synchronize_job(&manifest, &output, Some(&srt), Some(&report), cancel)
                .await
            {
                Ok(_) => {
                    succeeded += 1;
                    info!("Successfully processed: {}", manifest.display());
                }
                Err(e @ DubsyncError::Cancelled { .. }) => return Err(e),
                Err(e) => warn!("Failed to process {}: {}", manifest.display(), e),
            }
        }

        Ok(succeeded)
    }

    /// Dry run: plan slots and per-segment decisions without transcoding.
    ///
    /// Clips without a declared duration are reported with no decision.
    pub async fn plan_job<P: AsRef<Path>>(&self, manifest_path: P) -> Result<JobPlan> {
        let manifest = JobManifest::from_file(manifest_path).await?;
        let policy = self.engine.policy();
        let plan = SlotPlanner::new(policy).plan(
            manifest.segments,
            manifest.total_duration,
            manifest.speech_start_hint,
        )?;

        let mut segments = Vec::with_capacity(plan.slots.len());
        let mut expected_overflow = 0.0;
        for slot in &plan.slots {
            let failed = manifest.failures.iter().any(|f| f.segment_index == slot.index);
            let natural = manifest
                .clips
                .iter()
                .find(|clip| clip.segment_index == slot.index)
                .and_then(|clip| clip.natural_duration);

            let (decision, tempo_factors, overflow) = match natural {
                _ if failed => ("silence (synthesis failed)".to_string(), Vec::new(), 0.0),
                None => ("unknown (duration not declared)".to_string(), Vec::new(), 0.0),
                Some(natural) => match normalizer::plan(slot.duration(), natural, policy)? {
                    NormalizationPlan::Silence => ("silence".to_string(), Vec::new(), 0.0),
                    NormalizationPlan::Fit { chain, .. } => {
                        ("fit".to_string(), chain.factors().to_vec(), 0.0)
                    }
                    NormalizationPlan::Overflow { chain, overflow, .. } => {
                        ("overflow".to_string(), chain.factors().to_vec(), overflow)
                    }
                },
            };
            expected_overflow += overflow;

            segments.push(PlannedSegment {
                segment_index: slot.index,
                window_start: slot.window_start,
                window_end: slot.window_end,
                gap_before: slot.gap_before,
                natural_duration: natural,
                decision,
                tempo_factors,
                expected_overflow: overflow,
            });
        }

        Ok(JobPlan {
            segments,
            warnings: plan.warnings,
            expected_overflow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const MANIFEST: &str = r#"{
        "total_duration": 30.0,
        "speech_start_hint": 0.0,
        "segments": [
            {"index": 0, "start": 0.0, "end": 5.0, "text": "a"},
            {"index": 1, "start": 7.0, "end": 10.0, "text": "b"},
            {"index": 2, "start": 12.0, "end": 15.0, "text": "c"}
        ],
        "clips": [
            {"segment_index": 0, "natural_duration": 4.9, "media_ref": "0.wav"},
            {"segment_index": 1, "natural_duration": 9.0, "media_ref": "1.wav"}
        ],
        "failures": [{"segment_index": 2, "reason": "tts timeout"}]
    }"#;

    fn workflow(config: Config) -> Workflow {
        let mock = crate::media::MockTranscoder::new();
        Workflow::with_transcoder(config, Arc::new(mock)).unwrap()
    }

    #[tokio::test]
    async fn test_plan_job_reports_decisions() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("job.json");
        file.write_str(MANIFEST).unwrap();

        let mut config = Config::default();
        config.sync.max_speedup_ratio = Some(1.5);
        let plan = workflow(config).plan_job(file.path()).await.unwrap();

        assert_eq!(plan.segments.len(), 3);
        assert_eq!(plan.segments[0].decision, "fit");
        assert!(plan.segments[0].tempo_factors.is_empty());
        assert_eq!(plan.segments[1].decision, "overflow");
        assert!((plan.segments[1].expected_overflow - 3.0).abs() < 1e-9);
        assert_eq!(plan.segments[2].decision, "silence (synthesis failed)");
        assert!((plan.expected_overflow - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_process_directory_rejects_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("job.json");
        file.write_str(MANIFEST).unwrap();

        let result = workflow(Config::default())
            .process_directory(file.path(), None::<&Path>, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(DubsyncError::Config(_))));
    }
}
