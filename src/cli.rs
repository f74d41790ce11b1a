use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tilepath::{
    AlwaysOpen, Deadline, DenoiseFilter, Framebuffer, LivenessSignal, NoPreview, NoiseWorker,
    PostProcessFilter as _, PreviewStep, Progress, RenderConfig, RunOutcome, render,
};
use tracing::{Level, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tilepath", version)]
struct Cli {
    /// More log output. Repeat for even more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the canvas tile by tile, writing progress snapshots along the way.
    Render(RenderArgs),
    /// Run the denoising filter from a parameter file over an existing image.
    Filter(FilterArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// JSON parameter file.
    #[arg(long)]
    config: PathBuf,

    /// Overrides the snapshot directory from the parameter file.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Overrides the number of tiles rendered at once.
    #[arg(long)]
    workers: Option<usize>,

    /// Stop scheduling new tiles after this many seconds.
    #[arg(long)]
    time_limit: Option<f64>,

    /// Don't show the progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// JSON parameter file with the filter settings.
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    output: PathBuf,
}

/// Shows render progress as a terminal progress bar.
struct ProgressPreview {
    bar: ProgressBar,
}

impl ProgressPreview {
    fn new() -> anyhow::Result<Self> {
        let bar = ProgressBar::no_length().with_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} tiles, {msg} [{elapsed_precise}]")
                .context("progress bar template")?,
        );
        Ok(ProgressPreview { bar })
    }
}

impl PreviewStep for ProgressPreview {
    fn display(&mut self, _framebuffer: &Framebuffer, progress: &Progress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.finished() as u64);
        self.bar.set_message(format!("{} running, {} failed", progress.in_flight, progress.failed));
    }
}

impl Drop for ProgressPreview {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Filter(args) => cmd_filter(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = RenderConfig::load(&args.config)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(workers) = args.workers {
        config.max_workers = Some(workers);
    }

    let worker = NoiseWorker::from_params(&config.render)?;

    let liveness: Box<dyn LivenessSignal> = match args.time_limit {
        Some(secs) => {
            let limit = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid time limit {secs}"))?;
            Box::new(Deadline::after(limit))
        }
        None => Box::new(AlwaysOpen),
    };
    let preview: Box<dyn PreviewStep> = if args.no_progress {
        Box::new(NoPreview)
    } else {
        Box::new(ProgressPreview::new()?)
    };

    match render(&config, worker, preview, liveness)? {
        RunOutcome::Completed {
            snapshot,
            failed_tiles,
            elapsed,
        } => {
            if !failed_tiles.is_empty() {
                warn!(count = failed_tiles.len(), "some tiles failed and were left unrendered");
            }
            info!(
                path = %snapshot.path.display(),
                secs = elapsed.as_secs_f64(),
                "done"
            );
            if let Some(filtered) = snapshot.filtered {
                info!(path = %filtered.display(), "denoised copy");
            }
        }
        RunOutcome::Interrupted {
            last_snapshot,
            progress,
        } => {
            warn!(
                finished = progress.finished(),
                total = progress.total,
                last_snapshot = ?last_snapshot,
                "stopped before the canvas was complete"
            );
        }
    }
    Ok(())
}

fn cmd_filter(args: FilterArgs) -> anyhow::Result<()> {
    let config = RenderConfig::load(&args.config)?;
    let filter = DenoiseFilter::new(config.denoise)?;
    filter
        .filter(&args.input, &args.output)
        .with_context(|| format!("denoising '{}'", args.input.display()))?;
    info!(path = %args.output.display(), "denoised image written");
    Ok(())
}
