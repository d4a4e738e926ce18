use serde::Serialize;
use std::fmt;

/// Non-fatal deviations recorded while synchronizing a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// Segments arrived out of order and were re-sorted by start time
    Reordered { moved: usize },
    /// Segment window starts before the previous one ends
    Overlap { segment_index: usize, seconds: f64 },
    /// First segment start moved to the detected speech start
    LeadingSilenceCorrected { segment_index: usize, from: f64, to: f64 },
    /// Detected speech start was unusable for the first segment
    LeadingSilenceIgnored { segment_index: usize, detected: f64 },
    /// Segment ends after the contractual track duration
    BeyondTotal { segment_index: usize, end: f64, total_duration: f64 },
    /// Synthesizer produced nothing for the segment; silence was placed
    SynthesisFailed { segment_index: usize, reason: String },
    /// Transcoder failed on the segment; silence was placed
    TranscodeDegraded { segment_index: usize, cause: String },
    /// Clip could not be compressed into its slot; the timeline was widened
    Overflow { segment_index: usize, seconds: f64 },
    /// First concat attempt failed and a simplified component list was used
    ConcatRetried { cause: String, dropped: usize },
    /// Final track deviates from its expected duration
    DurationMismatch { expected: f64, actual: f64 },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::Reordered { moved } => {
                write!(f, "{} segments were out of order and have been re-sorted", moved)
            }
            SyncWarning::Overlap { segment_index, seconds } => {
                write!(f, "segment {} overlaps the previous one by {:.3}s", segment_index, seconds)
            }
            SyncWarning::LeadingSilenceCorrected { segment_index, from, to } => write!(
                f,
                "segment {} start corrected from {:.3}s to detected speech start {:.3}s",
                segment_index, from, to
            ),
            SyncWarning::LeadingSilenceIgnored { segment_index, detected } => write!(
                f,
                "detected speech start {:.3}s lies beyond segment {}; start left unchanged",
                detected, segment_index
            ),
            SyncWarning::BeyondTotal { segment_index, end, total_duration } => write!(
                f,
                "segment {} ends at {:.3}s, after the track duration {:.3}s",
                segment_index, end, total_duration
            ),
            SyncWarning::SynthesisFailed { segment_index, reason } => {
                write!(f, "segment {} synthesis failed ({}); silence placed", segment_index, reason)
            }
            SyncWarning::TranscodeDegraded { segment_index, cause } => {
                write!(f, "segment {} could not be transcoded ({}); silence placed", segment_index, cause)
            }
            SyncWarning::Overflow { segment_index, seconds } => write!(
                f,
                "segment {} overflows its slot by {:.3}s; timeline widened",
                segment_index, seconds
            ),
            SyncWarning::ConcatRetried { cause, dropped } => write!(
                f,
                "final concat retried without {} unusable components after: {}",
                dropped, cause
            ),
            SyncWarning::DurationMismatch { expected, actual } => write!(
                f,
                "final track is {:.3}s, expected {:.3}s",
                actual, expected
            ),
        }
    }
}
