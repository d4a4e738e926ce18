//! dubsync - Audio timeline synchronization for dubbed video
//!
//! Command line entry point: loads configuration, wires up logging and
//! Ctrl-C cancellation, then dispatches to the workflow.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use dubsync::cli::{Args, Commands};
use dubsync::config::Config;
use dubsync::sync::CancellationToken;
use dubsync::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    if let Commands::InitConfig { path } = &args.command {
        let mut config = Config::default();
        args.overrides.apply(&mut config);
        config.save_to_file(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("dubsync.toml").exists() {
                info!("Found dubsync.toml in current directory, loading...");
                Config::from_file("dubsync.toml")?
            } else {
                Config::default()
            }
        }
    };
    args.overrides.apply(&mut config);

    let workflow = Workflow::new(config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling job...");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Commands::Sync { manifest, output, srt, report } => {
            workflow.check().await?;
            let outcome = workflow
                .synchronize_job(&manifest, &output, srt.as_deref(), report.as_deref(), &cancel)
                .await?;
            println!(
                "Wrote {} ({:.3}s, overflow {:.3}s, {} warnings)",
                outcome.track.display(),
                outcome.track_duration,
                outcome.total_overflow,
                outcome.warnings.len()
            );
        }
        Commands::Batch { input_dir, output_dir } => {
            workflow.check().await?;
            let succeeded = workflow
                .process_directory(&input_dir, output_dir.as_ref(), &cancel)
                .await?;
            println!("{} jobs synchronized", succeeded);
        }
        Commands::Plan { manifest } => {
            let plan = workflow.plan_job(&manifest).await?;

            println!(
                "\n{:<6} {:<10} {:<10} {:<10} {:<10} {:<28} {:<10}",
                "Index", "Start", "End", "Gap", "Natural", "Decision", "Overflow"
            );
            println!("{}", "-".repeat(90));
            for row in &plan.segments {
                let natural = row
                    .natural_duration
                    .map(|d| format!("{:.3}", d))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<6} {:<10.3} {:<10.3} {:<10.3} {:<10} {:<28} {:<10.3}",
                    row.segment_index,
                    row.window_start,
                    row.window_end,
                    row.gap_before,
                    natural,
                    row.decision,
                    row.expected_overflow
                );
            }
            for warning in &plan.warnings {
                println!("warning: {}", warning);
            }
            println!("\nExpected overflow: {:.3}s", plan.expected_overflow);
        }
        Commands::Check => match workflow.check().await {
            Ok(version) => println!("{}", version),
            Err(e) => {
                error!("Transcoder check failed: {}", e);
                return Err(e.into());
            }
        },
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".dubsync").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "dubsync.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("dubsync.log").display()
    );

    Ok(())
}
