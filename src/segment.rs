use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One timestamped unit of recognized source speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSegment {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

impl SourceSegment {
    pub fn new<S: Into<String>>(index: usize, start: f64, end: f64, text: S) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Rendered speech for one segment, as delivered by the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedClip {
    pub segment_index: usize,
    /// Natural duration in seconds; zero marks a failed synthesis
    pub natural_duration: f64,
    pub media_ref: PathBuf,
}

impl SynthesizedClip {
    pub fn is_failed(&self) -> bool {
        !(self.natural_duration > 0.0)
    }
}

/// Time window a segment's translated audio must occupy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub index: usize,
    pub window_start: f64,
    pub window_end: f64,
    /// Silence inserted between the previous slot's planned end and this window
    pub gap_before: f64,
}

impl Slot {
    pub fn duration(&self) -> f64 {
        self.window_end - self.window_start
    }
}

/// How a normalized clip was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    /// Synthesized speech fitted to its slot
    Speech,
    /// Silence standing in for failed synthesis or transcoding
    Silence,
}

/// Per-segment output of the duration normalizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedClip {
    pub segment_index: usize,
    pub media_ref: PathBuf,
    pub actual_duration: f64,
    /// Seconds by which the clip exceeds its slot; absorbed by widening the timeline
    pub overflow: f64,
    pub kind: ClipKind,
}

/// Where a segment's audio ended up in the final track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub segment_index: usize,
    pub offset: f64,
    pub duration: f64,
    pub overflow: f64,
}

impl Placement {
    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_clip_detection() {
        let clip = |d: f64| SynthesizedClip {
            segment_index: 0,
            natural_duration: d,
            media_ref: PathBuf::from("a.wav"),
        };
        assert!(clip(0.0).is_failed());
        assert!(clip(f64::NAN).is_failed());
        assert!(!clip(1.5).is_failed());
    }
}
