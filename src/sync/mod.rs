// Audio timeline synchronization engine
//
// Reassembles independently timed synthesized clips into one track that
// follows the original segment timing:
// - Planner: segments -> slots (gaps, anomaly repair, leading silence fix)
// - Normalizer: per segment, fit a clip to its slot (parallel phase)
// - Assembler: forward-only placement and the single final concat (sequential phase)

pub mod assembler;
pub mod cancel;
pub mod normalizer;
pub mod planner;
pub mod report;
pub mod tempo;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub use assembler::{Timeline, TimelineAssembler, TimelineComponent};
pub use cancel::CancellationToken;
pub use normalizer::{ClipSource, DurationNormalizer, NormalizationPlan};
pub use planner::{SlotPlan, SlotPlanner};
pub use report::SyncWarning;
pub use tempo::TempoChain;

use crate::config::{EngineConfig, SyncPolicy};
use crate::error::{Result, DubsyncError};
use crate::media::Transcoder;
use crate::segment::{NormalizedClip, Placement, SourceSegment, SynthesizedClip};

/// Everything the engine needs for one translation job
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub segments: Vec<SourceSegment>,
    pub clips: Vec<SynthesizedClip>,
    /// Explicit synthesis failures, by segment index
    pub failures: Vec<(usize, String)>,
    /// Contractual length of the output track in seconds
    pub total_duration: f64,
    /// Detected start of speech in the original audio
    pub speech_start_hint: Option<f64>,
    pub output_path: PathBuf,
}

/// Result of a synchronized job
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub track: PathBuf,
    pub track_duration: f64,
    /// Segments with the leading-silence correction applied, in slot order
    pub corrected_segments: Vec<SourceSegment>,
    pub placements: Vec<Placement>,
    pub warnings: Vec<SyncWarning>,
    pub total_overflow: f64,
}

impl SyncOutcome {
    /// Amount by which the track exceeds the contractual duration
    pub fn excess(&self, total_duration: f64) -> f64 {
        (self.track_duration - total_duration).max(0.0)
    }
}

/// Entry point of the synchronization engine
pub struct SyncEngine {
    transcoder: Arc<dyn Transcoder>,
    policy: SyncPolicy,
    options: EngineConfig,
}

impl SyncEngine {
    pub fn new(transcoder: Arc<dyn Transcoder>, policy: SyncPolicy, options: EngineConfig) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            transcoder,
            policy,
            options,
        })
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Plan, normalize every segment in parallel, then assemble sequentially.
    pub async fn synchronize(&self, request: SyncRequest, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let plan = SlotPlanner::new(&self.policy).plan(
            request.segments,
            request.total_duration,
            request.speech_start_hint,
        )?;
        let sources = match_clips(&plan.slots, request.clips, request.failures)?;

        let scratch = self.scratch_dir(&request.output_path)?;
        info!(
            "Synchronizing {} segments into {:.3}s track (scratch: {})",
            plan.slots.len(),
            request.total_duration,
            scratch.path().display()
        );

        let mut warnings = plan.warnings.clone();
        let normalizer = DurationNormalizer::new(
            self.transcoder.clone(),
            self.policy.clone(),
            scratch.path().to_path_buf(),
        );

        // Phase 1
        let (clips, normalize_warnings) = self
            .normalize_all(normalizer, &plan, sources, cancel)
            .await?;
        warnings.extend(normalize_warnings);

        // Phase 2
        let timeline = TimelineAssembler::new(&plan.slots, &clips, request.total_duration)?.build(cancel)?;
        let rendered = timeline
            .render(
                self.transcoder.as_ref(),
                scratch.path(),
                &request.output_path,
                self.policy.duration_epsilon,
                cancel,
            )
            .await?;
        warnings.extend(rendered.warnings);

        if self.options.keep_scratch {
            let kept = scratch.keep();
            info!("Keeping scratch directory {}", kept.display());
        }

        info!(
            "Synchronization finished: {:.3}s track, {} warnings, overflow {:.3}s",
            rendered.duration,
            warnings.len(),
            timeline.total_overflow
        );

        Ok(SyncOutcome {
            track: rendered.path,
            track_duration: rendered.duration,
            corrected_segments: plan.segments,
            placements: timeline.placements,
            warnings,
            total_overflow: timeline.total_overflow,
        })
    }

    fn scratch_dir(&self, output: &Path) -> Result<tempfile::TempDir> {
        let prefix = format!("dubsync-{}-", uuid::Uuid::new_v4().simple());
        let parent = match &self.options.scratch_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir(),
        };
        std::fs::create_dir_all(&parent)?;
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir_in(&parent)?;
        if output.starts_with(dir.path()) {
            return Err(DubsyncError::InvalidInput(
                "Output track must not live inside the scratch directory".to_string(),
            ));
        }
        Ok(dir)
    }

    /// Run one normalizer per segment on a bounded worker pool, returning the
    /// results in slot order.
    async fn normalize_all(
        &self,
        normalizer: DurationNormalizer,
        plan: &SlotPlan,
        sources: Vec<ClipSource>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<NormalizedClip>, Vec<SyncWarning>)> {
        let total = plan.slots.len();
        let normalizer = Arc::new(normalizer);
        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let progress = self.progress_bar(total as u64);
        let mut tasks = JoinSet::new();

        for (position, (slot, source)) in plan.slots.iter().cloned().zip(sources).enumerate() {
            let normalizer = normalizer.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| DubsyncError::Assembly(format!("Worker pool closed: {}", e)))?;
                cancel.checkpoint("normalize", position, total)?;
                let result = normalizer.normalize_or_degrade(&slot, &source).await?;
                Ok::<_, DubsyncError>((position, result))
            });
        }

        let mut results: Vec<Option<NormalizedClip>> = vec![None; total];
        let mut warnings: Vec<(usize, Vec<SyncWarning>)> = Vec::with_capacity(total);
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| DubsyncError::Assembly(format!("Normalizer task failed: {}", e)))
                .and_then(|result| result);
            match outcome {
                Ok((position, (clip, segment_warnings))) => {
                    results[position] = Some(clip);
                    warnings.push((position, segment_warnings));
                    completed += 1;
                    progress.inc(1);
                }
                Err(e) => {
                    tasks.abort_all();
                    progress.abandon();
                    return Err(match e {
                        DubsyncError::Cancelled { phase, total, .. } => DubsyncError::Cancelled {
                            phase,
                            completed,
                            total,
                        },
                        other => other,
                    });
                }
            }
        }
        progress.finish_and_clear();

        warnings.sort_by_key(|(position, _)| *position);
        let clips = results
            .into_iter()
            .enumerate()
            .map(|(position, clip)| {
                clip.ok_or_else(|| {
                    DubsyncError::Assembly(format!("Segment at position {} was never normalized", position))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((clips, warnings.into_iter().flat_map(|(_, w)| w).collect()))
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Pair every slot with what the synthesizer produced for it
fn match_clips(
    slots: &[crate::segment::Slot],
    clips: Vec<SynthesizedClip>,
    failures: Vec<(usize, String)>,
) -> Result<Vec<ClipSource>> {
    let mut by_index: HashMap<usize, SynthesizedClip> = HashMap::with_capacity(clips.len());
    for clip in clips {
        if !slots.iter().any(|slot| slot.index == clip.segment_index) {
            return Err(DubsyncError::InvalidInput(format!(
                "Clip refers to unknown segment {}",
                clip.segment_index
            )));
        }
        if by_index.insert(clip.segment_index, clip).is_some() {
            return Err(DubsyncError::InvalidInput(
                "More than one clip for the same segment".to_string(),
            ));
        }
    }
    let mut failures: HashMap<usize, String> = failures.into_iter().collect();

    Ok(slots
        .iter()
        .map(|slot| match (by_index.remove(&slot.index), failures.remove(&slot.index)) {
            (_, Some(reason)) => ClipSource::Failed(reason),
            (Some(clip), None) => ClipSource::Rendered(clip),
            (None, None) => {
                warn!("No synthesized clip for segment {}", slot.index);
                ClipSource::Failed("no clip delivered".to_string())
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Slot;

    fn slot(index: usize) -> Slot {
        Slot {
            index,
            window_start: index as f64,
            window_end: index as f64 + 1.0,
            gap_before: 0.0,
        }
    }

    fn clip(index: usize) -> SynthesizedClip {
        SynthesizedClip {
            segment_index: index,
            natural_duration: 1.0,
            media_ref: PathBuf::from(format!("{}.wav", index)),
        }
    }

    #[test]
    fn test_match_clips_pairs_and_fills_failures() {
        let slots = vec![slot(0), slot(1), slot(2)];
        let sources = match_clips(
            &slots,
            vec![clip(0), clip(2)],
            vec![(2, "voice unavailable".to_string())],
        )
        .unwrap();

        assert_eq!(sources[0], ClipSource::Rendered(clip(0)));
        assert_eq!(sources[1], ClipSource::Failed("no clip delivered".to_string()));
        assert_eq!(sources[2], ClipSource::Failed("voice unavailable".to_string()));
    }

    #[test]
    fn test_match_clips_rejects_unknown_or_duplicate() {
        let slots = vec![slot(0)];
        assert!(matches!(
            match_clips(&slots, vec![clip(5)], vec![]),
            Err(DubsyncError::InvalidInput(_))
        ));
        assert!(matches!(
            match_clips(&slots, vec![clip(0), clip(0)], vec![]),
            Err(DubsyncError::InvalidInput(_))
        ));
    }
}
