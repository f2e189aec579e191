//! Hyperpulse - runs the parameter engine over an audio file and a
//! choreography, writing one JSON snapshot per line to stdout.

mod logging_setup;
mod wav;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hyperpulse_core::{
    ActionDispatcher, EngineConfig, EngineContext, PcmSource, Scheduler, SequenceAction,
    SpectrumConfig,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "hyperpulse",
    version,
    about = "Audio-reactive parameter engine for the 4D visualizer"
)]
struct Cli {
    /// WAV file to analyze (silence when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Choreography JSON (array of sequences)
    #[arg(short, long)]
    timeline: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tick rate; defaults to the configured rate
    #[arg(long)]
    fps: Option<f64>,

    /// Print every n-th snapshot
    #[arg(long, default_value_t = 1)]
    every: u64,

    /// Seconds to run without an input file; defaults to the timeline length
    #[arg(long)]
    duration: Option<f64>,

    /// Write the loaded timeline back out as JSON and exit
    #[arg(long)]
    export_timeline: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

/// Reports sequence actions on stderr
struct LogDispatcher;

impl ActionDispatcher for LogDispatcher {
    fn dispatch(&mut self, action: &SequenceAction) {
        match &action.args {
            Some(args) => info!("Action '{}' {}", action.action_type, args),
            None => info!("Action '{}'", action.action_type),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => EngineConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    logging_setup::init(&config.log)?;

    let fps = cli.fps.unwrap_or(config.tick_rate_hz);
    if !fps.is_finite() || fps <= 0.0 {
        bail!("Tick rate must be positive, got {}", fps);
    }
    let every = cli.every.max(1);

    let context = EngineContext::new(config.clone()).with_dispatcher(LogDispatcher);
    let mut scheduler = Scheduler::new(context);

    if let Some(path) = &cli.timeline {
        let report = scheduler
            .timeline_mut()
            .load_from_path(path)
            .with_context(|| format!("Failed to import timeline {:?}", path))?;
        info!(
            "Timeline loaded: {} sequences, {} rejected",
            report.imported, report.rejected
        );
    }

    if let Some(path) = &cli.export_timeline {
        scheduler
            .timeline()
            .save_to_path(path)
            .with_context(|| format!("Failed to export timeline {:?}", path))?;
        info!("Timeline exported to {:?}", path);
        return Ok(());
    }

    let seconds = match &cli.input {
        Some(path) => {
            let pcm = wav::read_mono(path)?;
            let seconds = pcm.duration_secs();
            info!(
                "Loaded {:?}: {:.1}s at {} Hz",
                path, seconds, pcm.sample_rate
            );
            let spectrum = SpectrumConfig {
                sample_rate: pcm.sample_rate,
                ..config.spectrum.clone()
            };
            scheduler.set_input(PcmSource::for_tick_rate(pcm.samples, fps, spectrum));
            seconds
        }
        None => cli
            .duration
            .unwrap_or_else(|| scheduler.timeline().total_duration()),
    };

    let ticks = (seconds.max(0.0) * fps).ceil() as u64;
    let dt = 1.0 / fps;
    info!("Running {} ticks at {} Hz", ticks, fps);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for _ in 0..ticks {
        let snapshot = scheduler.tick(dt);
        if snapshot.tick % every == 0 {
            serde_json::to_writer(&mut out, &snapshot).context("Failed to encode snapshot")?;
            writeln!(out).context("Failed to write snapshot")?;
        }
    }
    out.flush()?;

    Ok(())
}
