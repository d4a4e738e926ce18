use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, DubsyncError, TranscodeOperation};

/// Maximum tail of stderr carried into an error message
const STDERR_TAIL: usize = 400;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    pub operation: TranscodeOperation,
}

/// Captured output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(
        binary_path: S1,
        operation: TranscodeOperation,
        description: S2,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            operation,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Keep ffmpeg quiet apart from errors
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-nostdin").arg("-loglevel").arg("error")
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add audio filter
    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Execute the command, killing it if it runs longer than `timeout`
    pub async fn execute(&self, timeout: Duration) -> Result<CommandOutput> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                DubsyncError::transcode(
                    self.operation,
                    format!("{} timed out after {}s", self.description, timeout.as_secs_f64()),
                )
            })?
            .map_err(|e| {
                DubsyncError::transcode(
                    self.operation,
                    format!("Failed to execute {}: {}", self.binary_path, e),
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(DubsyncError::transcode(
                self.operation,
                format!("{} failed ({}): {}", self.description, output.status, tail(&stderr)),
            ));
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

fn tail(text: &str) -> &str {
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text;
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Format seconds for ffmpeg time arguments
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.6}", seconds.max(0.0))
}

/// ffmpeg channel layout name for a channel count
pub fn channel_layout(channels: u32) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        n => format!("{}c", n),
    }
}

/// Builder for the primitive operations the synchronization engine needs
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    ffmpeg_path: String,
    ffprobe_path: String,
    sample_rate: u32,
    channels: u32,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S1: Into<String>, S2: Into<String>>(
        ffmpeg_path: S1,
        ffprobe_path: S2,
        sample_rate: u32,
        channels: u32,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            sample_rate,
            channels,
        }
    }

    fn ffmpeg<S: Into<String>>(&self, operation: TranscodeOperation, description: S) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, operation, description).quiet().overwrite()
    }

    /// Apply the uniform intermediate format (PCM s16le at the configured rate and layout)
    fn uniform_format(&self, cmd: MediaCommand) -> MediaCommand {
        cmd.no_video()
            .audio_channels(self.channels)
            .audio_sample_rate(self.sample_rate)
            .audio_codec("pcm_s16le")
    }

    /// Build duration probe command
    pub fn probe_duration<P: AsRef<Path>>(&self, clip: P) -> MediaCommand {
        MediaCommand::new(&self.ffprobe_path, TranscodeOperation::Probe, "Duration probe")
            .arg("-v").arg("error")
            .arg("-show_entries").arg("format=duration")
            .arg("-of").arg("default=noprint_wrappers=1:nokey=1")
            .output(clip)
    }

    /// Build hard-duration trim command
    pub fn trim_to_max<P: AsRef<Path>>(&self, clip: P, max_duration: f64, output: P) -> MediaCommand {
        let cmd = self
            .ffmpeg(TranscodeOperation::Trim, format!("Trim to {:.3}s", max_duration))
            .input(clip)
            .arg("-t").arg(format_seconds(max_duration));
        self.uniform_format(cmd).output(output)
    }

    /// Build sample-accurate silence generation command
    pub fn silence<P: AsRef<Path>>(&self, duration: f64, output: P) -> MediaCommand {
        let samples = (duration * self.sample_rate as f64).round().max(1.0) as u64;
        let cmd = self
            .ffmpeg(TranscodeOperation::Silence, format!("Silence of {:.3}s", duration))
            .arg("-f").arg("lavfi")
            .arg("-i").arg(format!(
                "anullsrc=channel_layout={}:sample_rate={}",
                channel_layout(self.channels),
                self.sample_rate
            ))
            .audio_filter(format!("atrim=end_sample={}", samples));
        self.uniform_format(cmd).output(output)
    }

    /// Build tempo change command; an empty filter only re-encodes into the uniform format
    pub fn tempo<P: AsRef<Path>>(&self, clip: P, filter: &str, output: P) -> MediaCommand {
        let description = if filter.is_empty() {
            "Format normalization".to_string()
        } else {
            format!("Tempo change ({})", filter)
        };
        let mut cmd = self.ffmpeg(TranscodeOperation::Tempo, description).input(clip);
        if !filter.is_empty() {
            cmd = cmd.audio_filter(filter);
        }
        self.uniform_format(cmd).output(output)
    }

    /// Build ordered concatenation command from a concat demuxer list file
    pub fn concat<P: AsRef<Path>>(&self, list_file: P, output: P) -> MediaCommand {
        let cmd = self
            .ffmpeg(TranscodeOperation::Concat, "Concatenation")
            .arg("-f").arg("concat")
            .arg("-safe").arg("0")
            .input(list_file);
        self.uniform_format(cmd).output(output)
    }

    /// Build leading silence detection command (results are reported on stderr)
    pub fn detect_silence<P: AsRef<Path>>(&self, audio: P, noise_db: f64, min_duration: f64) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, TranscodeOperation::SilenceDetect, "Silence detection")
            .arg("-hide_banner")
            .arg("-nostdin")
            .input(audio)
            .audio_filter(format!("silencedetect=noise={}dB:d={}", noise_db, min_duration))
            .arg("-f").arg("null")
            .arg("-")
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, TranscodeOperation::Version, "Version check")
            .arg("-version")
    }
}

/// Render a concat demuxer list for the given clips
pub fn concat_list<P: AsRef<Path>>(clips: &[P]) -> String {
    clips
        .iter()
        .map(|clip| {
            let path = clip.as_ref().to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", path)
        })
        .collect()
}

/// Parse ffprobe `format=duration` output
pub fn parse_probe_duration(stdout: &str) -> Result<f64> {
    let value = stdout.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    let duration: f64 = value.parse().map_err(|_| {
        DubsyncError::transcode(
            TranscodeOperation::Probe,
            format!("Unexpected ffprobe output: {:?}", value),
        )
    })?;
    if !duration.is_finite() || duration < 0.0 {
        return Err(DubsyncError::transcode(
            TranscodeOperation::Probe,
            format!("Invalid probed duration: {}", duration),
        ));
    }
    Ok(duration)
}

/// Find where speech starts from `silencedetect` output.
///
/// Only a silence that starts at the very beginning of the audio counts; the
/// end of that silence is the speech start. Anything else means speech starts at 0.
pub fn parse_speech_start(stderr: &str) -> f64 {
    let value_after = |line: &str, key: &str| -> Option<f64> {
        let rest = line.split(key).nth(1)?;
        rest.split('|').next()?.trim().parse().ok()
    };

    let mut leading = false;
    for line in stderr.lines() {
        if line.contains("silence_start:") {
            match value_after(line, "silence_start:") {
                Some(start) if start <= 0.05 => leading = true,
                _ => return 0.0,
            }
        } else if line.contains("silence_end:") {
            if !leading {
                return 0.0;
            }
            return value_after(line, "silence_end:").unwrap_or(0.0);
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> MediaCommandBuilder {
        MediaCommandBuilder::new("ffmpeg", "ffprobe", 44100, 2)
    }

    #[test]
    fn test_silence_command_is_sample_accurate() {
        let cmd = builder().silence(0.4, Path::new("/tmp/pad.wav"));
        assert_eq!(cmd.operation, TranscodeOperation::Silence);
        assert!(cmd.args.contains(&"atrim=end_sample=17640".to_string()));
        assert!(cmd.args.contains(&"anullsrc=channel_layout=stereo:sample_rate=44100".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "/tmp/pad.wav");
    }

    #[test]
    fn test_tempo_command_with_and_without_filter() {
        let b = builder();
        let chained = b.tempo(Path::new("in.wav"), "atempo=2.0,atempo=1.2", Path::new("out.wav"));
        assert!(chained.args.windows(2).any(|w| w[0] == "-af" && w[1] == "atempo=2.0,atempo=1.2"));

        let plain = b.tempo(Path::new("in.wav"), "", Path::new("out.wav"));
        assert!(!plain.args.contains(&"-af".to_string()));
        assert!(plain.args.contains(&"pcm_s16le".to_string()));
    }

    #[test]
    fn test_trim_command_uses_hard_cutoff() {
        let cmd = builder().trim_to_max(Path::new("in.wav"), 5.0, Path::new("out.wav"));
        assert!(cmd.args.windows(2).any(|w| w[0] == "-t" && w[1] == "5.000000"));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&["/tmp/a.wav", "/tmp/it's.wav"]);
        assert_eq!(list, "file '/tmp/a.wav'\nfile '/tmp/it'\\''s.wav'\n");
    }

    #[test]
    fn test_parse_probe_duration() {
        assert_eq!(parse_probe_duration("12.345000\n").unwrap(), 12.345);
        assert!(matches!(
            parse_probe_duration("N/A\n"),
            Err(DubsyncError::Transcode { operation: TranscodeOperation::Probe, .. })
        ));
    }

    #[test]
    fn test_parse_speech_start_leading_silence() {
        let stderr = "[silencedetect @ 0x1] silence_start: 0\n\
                      [silencedetect @ 0x1] silence_end: 8.14575 | silence_duration: 8.14575\n\
                      [silencedetect @ 0x1] silence_start: 20.5\n";
        assert_eq!(parse_speech_start(stderr), 8.14575);
    }

    #[test]
    fn test_parse_speech_start_ignores_later_silence() {
        let stderr = "[silencedetect @ 0x1] silence_start: 3.2\n\
                      [silencedetect @ 0x1] silence_end: 4.0 | silence_duration: 0.8\n";
        assert_eq!(parse_speech_start(stderr), 0.0);
        assert_eq!(parse_speech_start(""), 0.0);
    }

    #[tokio::test]
    async fn test_missing_binary_maps_to_transcode_error() {
        let cmd = MediaCommand::new("/nonexistent/dubsync-ffmpeg", TranscodeOperation::Probe, "Probe");
        let err = cmd.execute(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, DubsyncError::Transcode { operation: TranscodeOperation::Probe, .. }));
    }
}
