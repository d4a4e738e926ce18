use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::error::{Result, DubsyncError};
use crate::segment::SourceSegment;
use crate::sync::SyncOutcome;

/// Generate SRT subtitle file from segments
pub async fn generate_srt<P: AsRef<Path>>(
    segments: &[SourceSegment],
    output_path: P,
) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    fs::write(output_path, render_srt(segments)).await
        .map_err(|e| DubsyncError::Io(e))?;

    info!("SRT file generated successfully");
    Ok(())
}

/// Render segments as SRT text
pub fn render_srt(segments: &[SourceSegment]) -> String {
    let mut srt_content = String::new();

    for (index, segment) in segments.iter().enumerate() {
        let start_time = format_srt_time(segment.start);
        let end_time = format_srt_time(segment.end);

        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            start_time,
            end_time,
            segment.text.trim()
        ));
    }

    srt_content
}

/// Segments retimed to where their audio was actually placed.
///
/// Identical to the corrected segments unless an overflow widened the
/// timeline, in which case later subtitles move with the audio.
pub fn placed_segments(outcome: &SyncOutcome) -> Vec<SourceSegment> {
    outcome
        .corrected_segments
        .iter()
        .zip(&outcome.placements)
        .map(|(segment, placement)| SourceSegment {
            index: segment.index,
            start: placement.offset,
            end: placement.end(),
            text: segment.text.clone(),
        })
        .collect()
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Placement;
    use std::path::PathBuf;

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(65.123), "00:01:05,123");
        assert_eq!(format_srt_time(3661.500), "01:01:01,500");
    }

    #[test]
    fn test_generate_srt_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");
        let segments = vec![SourceSegment::new(4, 1.0, 2.5, "hello")];

        tokio_test::block_on(generate_srt(&segments, &path)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "1\n00:00:01,000 --> 00:00:02,500\nhello\n\n"
        );
    }

    #[test]
    fn test_placed_segments_follow_overflow() {
        let outcome = SyncOutcome {
            track: PathBuf::from("dub.wav"),
            track_duration: 37.0,
            corrected_segments: vec![
                SourceSegment::new(0, 0.0, 5.0, " first "),
                SourceSegment::new(1, 8.0, 10.0, "second"),
            ],
            placements: vec![
                Placement { segment_index: 0, offset: 0.0, duration: 12.0, overflow: 7.0 },
                Placement { segment_index: 1, offset: 15.0, duration: 2.0, overflow: 0.0 },
            ],
            warnings: vec![],
            total_overflow: 7.0,
        };

        let placed = placed_segments(&outcome);
        assert_eq!(placed[1].start, 15.0);
        assert_eq!(placed[1].end, 17.0);
        assert_eq!(
            render_srt(&placed),
            "1\n00:00:00,000 --> 00:00:12,000\nfirst\n\n2\n00:00:15,000 --> 00:00:17,000\nsecond\n\n"
        );
    }
}
