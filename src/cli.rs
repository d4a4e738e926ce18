use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, SyncPolicy};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: PolicyOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Command line overrides applied on top of the configuration file
#[derive(clap::Args, Debug, Default)]
pub struct PolicyOverrides {
    /// Number of segments normalized in parallel
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Maximum total speed-up factor (1.0 disables speed-up)
    #[arg(long, global = true)]
    pub max_speedup: Option<f64>,

    /// Maximum total slow-down factor (1.0 pads instead of stretching)
    #[arg(long, global = true)]
    pub max_slowdown: Option<f64>,

    /// Relative duration mismatch left untouched
    #[arg(long, global = true)]
    pub tolerance: Option<f64>,

    /// Use the legacy policy capping speed-up at 1.3x
    #[arg(long, global = true)]
    pub legacy: bool,

    /// Keep the scratch directory after the job
    #[arg(long, global = true)]
    pub keep_scratch: bool,
}

impl PolicyOverrides {
    pub fn apply(&self, config: &mut Config) {
        if self.legacy {
            config.sync.max_speedup_ratio = SyncPolicy::legacy().max_speedup_ratio;
        }
        if let Some(workers) = self.workers {
            config.engine.workers = workers;
        }
        if let Some(ratio) = self.max_speedup {
            config.sync.max_speedup_ratio = Some(ratio);
        }
        if let Some(ratio) = self.max_slowdown {
            config.sync.max_slowdown_ratio = Some(ratio);
        }
        if let Some(tolerance) = self.tolerance {
            config.sync.tolerance_ratio = tolerance;
        }
        if self.keep_scratch {
            config.engine.keep_scratch = true;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize the clips of one job manifest into a single track
    Sync {
        /// Job manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Output audio track
        #[arg(short, long)]
        output: PathBuf,

        /// Write subtitles retimed to the placed audio
        #[arg(long)]
        srt: Option<PathBuf>,

        /// Write a JSON report of placements and warnings
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Synchronize every manifest in a directory
    Batch {
        /// Input directory containing job manifests
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory for tracks, subtitles and reports
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show slots and per-segment decisions without transcoding
    Plan {
        /// Job manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "dubsync.toml")]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_legacy() {
        let args = Args::parse_from([
            "dubsync",
            "--legacy",
            "--max-slowdown",
            "1.2",
            "--workers",
            "2",
            "plan",
            "--manifest",
            "job.json",
        ]);
        let mut config = Config::default();
        config.sync.tolerance_ratio = 0.2;
        config.sync.duration_epsilon = 0.05;
        args.overrides.apply(&mut config);

        assert_eq!(config.sync.max_speedup_ratio, Some(1.3));
        assert_eq!(config.sync.tolerance_ratio, 0.2);
        assert_eq!(config.sync.duration_epsilon, 0.05);
        assert_eq!(config.sync.max_slowdown_ratio, Some(1.2));
        assert_eq!(config.engine.workers, 2);
        assert!(!config.engine.keep_scratch);
        assert!(matches!(args.command, Commands::Plan { .. }));
    }
}
