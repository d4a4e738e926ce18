//! dubsync - Audio timeline synchronization for dubbed video
//!
//! Takes the timed segments of an original recording and the independently
//! synthesized clips of their translation, and assembles one audio track in
//! which every clip starts where its segment started.

pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod media;
pub mod segment;
pub mod subtitle;
pub mod sync;
pub mod workflow;
