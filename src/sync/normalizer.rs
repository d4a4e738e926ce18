use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SyncPolicy;
use crate::error::{Result, DubsyncError};
use crate::media::Transcoder;
use crate::segment::{ClipKind, NormalizedClip, Slot, SynthesizedClip};
use super::report::SyncWarning;
use super::tempo::TempoChain;

/// Shortfall below which a fitted clip is not padded
pub const PAD_EPSILON: f64 = 1e-4;

/// What the synthesizer delivered for one segment
#[derive(Debug, Clone, PartialEq)]
pub enum ClipSource {
    Rendered(SynthesizedClip),
    Failed(String),
}

/// Decision taken for one segment before anything is transcoded
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationPlan {
    /// Nothing to fit, the slot is filled with silence
    Silence,
    /// Apply `chain`, trim to the slot and pad any shortfall
    Fit { chain: TempoChain, expected_duration: f64 },
    /// Apply `chain` and keep the full clip; the timeline absorbs `overflow`
    Overflow { chain: TempoChain, expected_duration: f64, overflow: f64 },
}

/// Decide how a clip of `natural_duration` is made to fit `slot_duration`
pub fn plan(slot_duration: f64, natural_duration: f64, policy: &SyncPolicy) -> Result<NormalizationPlan> {
    if !(slot_duration > 0.0) {
        return Err(DubsyncError::InvalidInput(format!(
            "Slot must have a positive width, got {}",
            slot_duration
        )));
    }
    if !natural_duration.is_finite() || natural_duration <= 0.0 {
        return Ok(NormalizationPlan::Silence);
    }

    let ratio = natural_duration / slot_duration;
    if (ratio - 1.0).abs() <= policy.tolerance_ratio {
        return Ok(NormalizationPlan::Fit {
            chain: TempoChain::identity(),
            expected_duration: natural_duration,
        });
    }

    // Clamp to the distortion ceiling in the direction of the change
    let applied = if ratio > 1.0 {
        match policy.max_speedup_ratio {
            Some(ceiling) => ratio.min(ceiling.max(1.0)),
            None => ratio,
        }
    } else {
        match policy.max_slowdown_ratio {
            Some(ceiling) => ratio.max(1.0 / ceiling.max(1.0)),
            None => ratio,
        }
    };

    let chain = TempoChain::decompose(applied)?;
    let expected_duration = natural_duration / applied;

    if expected_duration > slot_duration * (1.0 + policy.tolerance_ratio) {
        Ok(NormalizationPlan::Overflow {
            chain,
            expected_duration,
            overflow: expected_duration - slot_duration,
        })
    } else {
        Ok(NormalizationPlan::Fit {
            chain,
            expected_duration,
        })
    }
}

/// Per-segment duration normalizer; independent of every other segment
#[derive(Clone)]
pub struct DurationNormalizer {
    transcoder: Arc<dyn Transcoder>,
    policy: SyncPolicy,
    scratch_dir: PathBuf,
}

impl DurationNormalizer {
    pub fn new(transcoder: Arc<dyn Transcoder>, policy: SyncPolicy, scratch_dir: PathBuf) -> Self {
        Self {
            transcoder,
            policy,
            scratch_dir,
        }
    }

    /// Scratch file for one processing stage of one segment
    fn scratch_path(&self, index: usize, stage: &str) -> PathBuf {
        self.scratch_dir.join(format!("seg_{:04}_{}.wav", index, stage))
    }

    /// Normalize one segment, degrading to silence on synthesis or transcoder failure.
    ///
    /// Only fails when even the replacement silence cannot be produced.
    pub async fn normalize_or_degrade(
        &self,
        slot: &Slot,
        source: &ClipSource,
    ) -> Result<(NormalizedClip, Vec<SyncWarning>)> {
        let mut warnings = Vec::new();

        let clip = match source {
            ClipSource::Failed(reason) => {
                warn!("Segment {} synthesis failed: {}", slot.index, reason);
                warnings.push(SyncWarning::SynthesisFailed {
                    segment_index: slot.index,
                    reason: reason.clone(),
                });
                None
            }
            ClipSource::Rendered(clip) if clip.is_failed() => {
                warn!("Segment {} has an empty synthesized clip", slot.index);
                warnings.push(SyncWarning::SynthesisFailed {
                    segment_index: slot.index,
                    reason: "empty clip".to_string(),
                });
                None
            }
            ClipSource::Rendered(clip) => Some(clip),
        };

        if let Some(clip) = clip {
            match self.normalize(slot, clip).await {
                Ok(normalized) => {
                    if normalized.overflow > 0.0 {
                        warn!(
                            "Segment {} overflows its {:.3}s slot by {:.3}s",
                            slot.index,
                            slot.duration(),
                            normalized.overflow
                        );
                        warnings.push(SyncWarning::Overflow {
                            segment_index: slot.index,
                            seconds: normalized.overflow,
                        });
                    }
                    return Ok((normalized, warnings));
                }
                Err(e) => {
                    warn!("Segment {} degraded to silence: {}", slot.index, e);
                    warnings.push(SyncWarning::TranscodeDegraded {
                        segment_index: slot.index,
                        cause: e.to_string(),
                    });
                }
            }
        }

        let silence = self.silence_clip(slot).await?;
        Ok((silence, warnings))
    }

    /// Fit one synthesized clip into its slot
    pub async fn normalize(&self, slot: &Slot, clip: &SynthesizedClip) -> Result<NormalizedClip> {
        let slot_duration = slot.duration();
        let decision = plan(slot_duration, clip.natural_duration, &self.policy)?;
        debug!(
            "Segment {}: natural {:.3}s, slot {:.3}s -> {:?}",
            slot.index, clip.natural_duration, slot_duration, decision
        );

        match decision {
            NormalizationPlan::Silence => self.silence_clip(slot).await,
            NormalizationPlan::Fit { chain, .. } => {
                let source = if chain.is_identity() {
                    clip.media_ref.clone()
                } else {
                    self.apply_tempo(slot.index, &clip.media_ref, &chain).await?
                };
                self.fit(slot, &source).await
            }
            NormalizationPlan::Overflow { chain, .. } => {
                // Identity chains still run so the kept clip shares the uniform format
                let adjusted = self.apply_tempo(slot.index, &clip.media_ref, &chain).await?;
                let actual = self.transcoder.probe_duration(&adjusted).await?;
                if actual > slot_duration + PAD_EPSILON {
                    return Ok(NormalizedClip {
                        segment_index: slot.index,
                        media_ref: adjusted,
                        actual_duration: actual,
                        overflow: actual - slot_duration,
                        kind: ClipKind::Speech,
                    });
                }
                self.fit(slot, &adjusted).await
            }
        }
    }

    async fn apply_tempo(&self, index: usize, source: &Path, chain: &TempoChain) -> Result<PathBuf> {
        let output = self.scratch_path(index, "tempo");
        self.transcoder.apply_tempo_chain(source, chain, &output).await?;
        Ok(output)
    }

    /// Trim to the slot, then pad the shortfall so the clip spans the slot exactly
    async fn fit(&self, slot: &Slot, source: &Path) -> Result<NormalizedClip> {
        let slot_duration = slot.duration();
        let trimmed = self.scratch_path(slot.index, "trim");
        self.transcoder.trim_to_max(source, slot_duration, &trimmed).await?;
        let actual = self.transcoder.probe_duration(&trimmed).await?;

        let media = if slot_duration - actual > PAD_EPSILON {
            let padding = self.scratch_path(slot.index, "pad");
            let fitted = self.scratch_path(slot.index, "fit");
            debug!("Segment {}: padding {:.3}s", slot.index, slot_duration - actual);
            self.transcoder.silence(slot_duration - actual, &padding).await?;
            self.transcoder
                .concat(&[trimmed.clone(), padding], &fitted)
                .await?;
            fitted
        } else {
            trimmed
        };

        Ok(NormalizedClip {
            segment_index: slot.index,
            media_ref: media,
            actual_duration: slot_duration,
            overflow: 0.0,
            kind: ClipKind::Speech,
        })
    }

    /// Silence spanning the whole slot
    async fn silence_clip(&self, slot: &Slot) -> Result<NormalizedClip> {
        let slot_duration = slot.duration();
        let output = self.scratch_path(slot.index, "silence");
        self.transcoder
            .silence(slot_duration, &output)
            .await
            .map_err(|e| {
                DubsyncError::Assembly(format!(
                    "Could not produce replacement silence for segment {}: {}",
                    slot.index, e
                ))
            })?;

        Ok(NormalizedClip {
            segment_index: slot.index,
            media_ref: output,
            actual_duration: slot_duration,
            overflow: 0.0,
            kind: ClipKind::Silence,
        })
    }
}
