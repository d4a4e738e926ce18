use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, DubsyncError};
use crate::media::Transcoder;
use crate::segment::{NormalizedClip, Placement, Slot};
use super::cancel::CancellationToken;
use super::report::SyncWarning;

/// Gaps shorter than this are not worth a silence component
const MIN_SILENCE: f64 = 1e-6;

/// One piece of the final track, in playback order
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineComponent {
    Silence { offset: f64, duration: f64 },
    Clip { segment_index: usize, offset: f64, duration: f64, media: PathBuf },
}

impl TimelineComponent {
    pub fn offset(&self) -> f64 {
        match self {
            TimelineComponent::Silence { offset, .. } | TimelineComponent::Clip { offset, .. } => *offset,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            TimelineComponent::Silence { duration, .. } | TimelineComponent::Clip { duration, .. } => *duration,
        }
    }
}

/// Fully placed track, ready to be rendered
#[derive(Debug, Clone)]
pub struct Timeline {
    pub components: Vec<TimelineComponent>,
    pub placements: Vec<Placement>,
    /// Sum of every component duration
    pub duration: f64,
    pub total_overflow: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblerState {
    AwaitGap(usize),
    AwaitClip(usize),
    Finalize,
}

/// Places normalized clips on a forward-only cursor, one segment at a time
pub struct TimelineAssembler<'a> {
    slots: &'a [Slot],
    clips: &'a [NormalizedClip],
    total_duration: f64,
}

impl<'a> TimelineAssembler<'a> {
    pub fn new(slots: &'a [Slot], clips: &'a [NormalizedClip], total_duration: f64) -> Result<Self> {
        if slots.len() != clips.len() {
            return Err(DubsyncError::Assembly(format!(
                "{} slots but {} normalized clips",
                slots.len(),
                clips.len()
            )));
        }
        if let Some((slot, clip)) = slots
            .iter()
            .zip(clips)
            .find(|(slot, clip)| slot.index != clip.segment_index)
        {
            return Err(DubsyncError::Assembly(format!(
                "Clip for segment {} paired with slot {}",
                clip.segment_index, slot.index
            )));
        }

        Ok(Self {
            slots,
            clips,
            total_duration,
        })
    }

    /// Walk every slot in order and lay out the track.
    ///
    /// The cursor only moves forward; an overflowing clip shifts everything
    /// after it, including the trailing silence, so the track ends at
    /// `total_duration` plus the accumulated overflow.
    pub fn build(&self, cancel: &CancellationToken) -> Result<Timeline> {
        let total = self.slots.len();
        let mut components = Vec::with_capacity(total * 2 + 1);
        let mut placements = Vec::with_capacity(total);
        let mut cursor = 0.0_f64;
        let mut total_overflow = 0.0_f64;
        let mut state = AssemblerState::AwaitGap(0);

        loop {
            state = match state {
                AssemblerState::AwaitGap(i) if i == total => AssemblerState::Finalize,
                AssemblerState::AwaitGap(i) => {
                    cancel.checkpoint("assemble", i, total)?;
                    let gap = self.slots[i].gap_before;
                    if gap > MIN_SILENCE {
                        components.push(TimelineComponent::Silence {
                            offset: cursor,
                            duration: gap,
                        });
                        cursor += gap;
                    }
                    AssemblerState::AwaitClip(i)
                }
                AssemblerState::AwaitClip(i) => {
                    let slot = &self.slots[i];
                    let clip = &self.clips[i];
                    let occupied = slot.duration() + clip.overflow;

                    components.push(TimelineComponent::Clip {
                        segment_index: clip.segment_index,
                        offset: cursor,
                        duration: occupied,
                        media: clip.media_ref.clone(),
                    });
                    placements.push(Placement {
                        segment_index: clip.segment_index,
                        offset: cursor,
                        duration: occupied,
                        overflow: clip.overflow,
                    });
                    debug!(
                        "Placed segment {} at {:.3}s for {:.3}s (planned {:.3}s)",
                        clip.segment_index, cursor, occupied, slot.window_start
                    );

                    cursor += occupied;
                    total_overflow += clip.overflow;
                    AssemblerState::AwaitGap(i + 1)
                }
                AssemblerState::Finalize => {
                    let trailing = self.total_duration + total_overflow - cursor;
                    if trailing > MIN_SILENCE {
                        components.push(TimelineComponent::Silence {
                            offset: cursor,
                            duration: trailing,
                        });
                        cursor += trailing;
                    }
                    break;
                }
            };
        }

        info!(
            "Timeline laid out: {} components, {:.3}s (overflow {:.3}s)",
            components.len(),
            cursor,
            total_overflow
        );

        Ok(Timeline {
            components,
            placements,
            duration: cursor,
            total_overflow,
        })
    }
}

/// Result of rendering a timeline into a single track
#[derive(Debug, Clone)]
pub struct RenderedTrack {
    pub path: PathBuf,
    pub duration: f64,
    pub warnings: Vec<SyncWarning>,
}

/// Hidden sibling of `output` that receives the concat before it is final
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "track".to_string());
    let name = match output.extension() {
        Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.partial", stem),
    };
    output.with_file_name(name)
}

impl Timeline {
    /// Generate the silences, then concatenate everything once into `output`.
    ///
    /// A failed concat is retried once without zero-length components. An
    /// unreadable component or a track shorter than planned fails the render
    /// and leaves no `output` behind.
    pub async fn render(
        &self,
        transcoder: &dyn Transcoder,
        scratch_dir: &Path,
        output: &Path,
        duration_epsilon: f64,
        cancel: &CancellationToken,
    ) -> Result<RenderedTrack> {
        let total = self.placements.len();
        let mut warnings = Vec::new();
        let mut inputs = Vec::with_capacity(self.components.len());

        for (position, component) in self.components.iter().enumerate() {
            debug!(
                "Component {}: {:.3}s at {:.3}s",
                position,
                component.duration(),
                component.offset()
            );
            match component {
                TimelineComponent::Silence { duration, .. } => {
                    let path = scratch_dir.join(format!("silence_{:04}.wav", position));
                    transcoder.silence(*duration, &path).await.map_err(|e| {
                        DubsyncError::Assembly(format!("Could not generate {:.3}s of silence: {}", duration, e))
                    })?;
                    inputs.push((path, *duration));
                }
                TimelineComponent::Clip { media, duration, .. } => {
                    inputs.push((media.clone(), *duration));
                }
            }
        }

        cancel.checkpoint("assemble", total, total)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let partial = partial_path(output);
        let paths: Vec<PathBuf> = inputs.iter().map(|(path, _)| path.clone()).collect();

        if let Err(first) = transcoder.concat(&paths, &partial).await {
            warn!("Final concat failed, retrying with a simplified component list: {}", first);

            let mut simplified = Vec::with_capacity(inputs.len());
            for (path, duration) in &inputs {
                if *duration <= MIN_SILENCE {
                    continue;
                }
                match transcoder.probe_duration(path).await {
                    Ok(probed) if probed > 0.0 => simplified.push(path.clone()),
                    Ok(_) => warn!("Dropping zero-length component {}", path.display()),
                    Err(e) => {
                        return Err(DubsyncError::Assembly(format!(
                            "Final concat failed ({}) and {:.3}s component {} is unreadable: {}",
                            first,
                            duration,
                            path.display(),
                            e
                        )));
                    }
                }
            }
            let dropped = inputs.len() - simplified.len();
            warnings.push(SyncWarning::ConcatRetried {
                cause: first.to_string(),
                dropped,
            });

            if simplified.is_empty() {
                return Err(DubsyncError::Assembly(format!(
                    "Final concat failed and no usable components remain: {}",
                    first
                )));
            }
            if let Err(second) = transcoder.concat(&simplified, &partial).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(DubsyncError::Assembly(format!(
                    "Final concat failed twice: {}; retry: {}",
                    first, second
                )));
            }
        }

        tokio::fs::rename(&partial, output).await.map_err(|e| {
            DubsyncError::Assembly(format!(
                "Could not move {} into place: {}",
                partial.display(),
                e
            ))
        })?;

        let duration = match transcoder.probe_duration(output).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Could not probe final track, assuming planned duration: {}", e);
                self.duration
            }
        };
        if duration < self.duration - duration_epsilon {
            let _ = tokio::fs::remove_file(output).await;
            return Err(DubsyncError::Assembly(format!(
                "Final track is {:.3}s, shorter than the planned {:.3}s",
                duration, self.duration
            )));
        }
        if duration > self.duration + duration_epsilon {
            warn!(
                "Final track is {:.3}s, expected {:.3}s",
                duration, self.duration
            );
            warnings.push(SyncWarning::DurationMismatch {
                expected: self.duration,
                actual: duration,
            });
        }

        info!("Synchronized track written to {} ({:.3}s)", output.display(), duration);
        Ok(RenderedTrack {
            path: output.to_path_buf(),
            duration,
            warnings,
        })
    }
}
