use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::SyncPolicy;
use crate::error::{Result, DubsyncError};
use crate::segment::{Slot, SourceSegment};
use super::report::SyncWarning;

/// Slots derived from the recognizer's segments
#[derive(Debug, Clone)]
pub struct SlotPlan {
    pub slots: Vec<Slot>,
    /// Segments in slot order, carrying the leading-silence correction
    pub segments: Vec<SourceSegment>,
    pub warnings: Vec<SyncWarning>,
}

impl SlotPlan {
    /// End of the last slot when every clip fits exactly
    pub fn planned_end(&self) -> f64 {
        self.slots
            .iter()
            .fold(0.0, |cursor, slot| cursor + slot.gap_before + slot.duration())
    }
}

/// Converts recognized segments into slots, repairing timing anomalies
pub struct SlotPlanner<'a> {
    policy: &'a SyncPolicy,
}

impl<'a> SlotPlanner<'a> {
    pub fn new(policy: &'a SyncPolicy) -> Self {
        Self { policy }
    }

    pub fn plan(
        &self,
        segments: Vec<SourceSegment>,
        total_duration: f64,
        speech_start_hint: Option<f64>,
    ) -> Result<SlotPlan> {
        validate(&segments, total_duration)?;

        let mut warnings = Vec::new();
        let mut segments = segments;

        let moved = segments
            .windows(2)
            .filter(|pair| pair[1].start < pair[0].start)
            .count();
        if moved > 0 {
            warn!("{} segments out of order, re-sorting by start time", moved);
            segments.sort_by(|a, b| a.start.total_cmp(&b.start));
            warnings.push(SyncWarning::Reordered { moved });
        }

        if let Some(detected) = speech_start_hint {
            self.correct_leading_silence(&mut segments[0], detected, &mut warnings);
        }

        let mut slots = Vec::with_capacity(segments.len());
        let mut planned_cursor = 0.0_f64;
        for segment in &segments {
            let gap_before = (segment.start - planned_cursor).max(0.0);
            if segment.start < planned_cursor && !slots.is_empty() {
                let seconds = planned_cursor - segment.start;
                warn!("Segment {} overlaps previous slot by {:.3}s", segment.index, seconds);
                warnings.push(SyncWarning::Overlap {
                    segment_index: segment.index,
                    seconds,
                });
            }
            if segment.end > total_duration {
                warn!(
                    "Segment {} ends at {:.3}s, after track duration {:.3}s",
                    segment.index, segment.end, total_duration
                );
                warnings.push(SyncWarning::BeyondTotal {
                    segment_index: segment.index,
                    end: segment.end,
                    total_duration,
                });
            }

            let slot = Slot {
                index: segment.index,
                window_start: segment.start,
                window_end: segment.end,
                gap_before,
            };
            planned_cursor += gap_before + slot.duration();
            debug!(
                "Slot {}: [{:.3}s - {:.3}s] gap {:.3}s",
                slot.index, slot.window_start, slot.window_end, slot.gap_before
            );
            slots.push(slot);
        }

        info!(
            "Planned {} slots, planned end {:.3}s of {:.3}s",
            slots.len(),
            planned_cursor,
            total_duration
        );

        Ok(SlotPlan {
            slots,
            segments,
            warnings,
        })
    }

    fn correct_leading_silence(
        &self,
        first: &mut SourceSegment,
        detected: f64,
        warnings: &mut Vec<SyncWarning>,
    ) {
        if !detected.is_finite() || detected <= 0.0 {
            return;
        }
        if first.start >= detected - self.policy.leading_silence_tolerance {
            return;
        }
        if detected >= first.end {
            warn!(
                "Detected speech start {:.2}s is past the end of segment {}, ignoring",
                detected, first.index
            );
            warnings.push(SyncWarning::LeadingSilenceIgnored {
                segment_index: first.index,
                detected,
            });
            return;
        }

        info!(
            "Detected silence at start: {:.2}s (recognizer reported: {:.2}s)",
            detected, first.start
        );
        warnings.push(SyncWarning::LeadingSilenceCorrected {
            segment_index: first.index,
            from: first.start,
            to: detected,
        });
        first.start = detected;
    }
}

fn validate(segments: &[SourceSegment], total_duration: f64) -> Result<()> {
    if segments.is_empty() {
        return Err(DubsyncError::InvalidInput("No segments to synchronize".to_string()));
    }
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(DubsyncError::InvalidInput(format!(
            "Total duration must be positive, got {}",
            total_duration
        )));
    }

    let mut seen = HashSet::new();
    for segment in segments {
        if !segment.start.is_finite() || !segment.end.is_finite() {
            return Err(DubsyncError::InvalidInput(format!(
                "Segment {} has non-finite timestamps",
                segment.index
            )));
        }
        if segment.start < 0.0 {
            return Err(DubsyncError::InvalidInput(format!(
                "Segment {} starts before zero ({})",
                segment.index, segment.start
            )));
        }
        if segment.end <= segment.start {
            return Err(DubsyncError::InvalidInput(format!(
                "Segment {} ends at {} which is not after its start {}",
                segment.index, segment.end, segment.start
            )));
        }
        if !seen.insert(segment.index) {
            return Err(DubsyncError::InvalidInput(format!(
                "Duplicate segment index {}",
                segment.index
            )));
        }
    }
    Ok(())
}
