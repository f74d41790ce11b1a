use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use bon::bon;
use tracing::{info, warn};

use crate::{
    config::RenderConfig,
    error::{RenderError, RenderResult},
    filter::DenoiseFilter,
    framebuffer::Framebuffer,
    planner::plan_tiles,
    renderer::{Dispatch, Progress, RenderWorker, Scheduler, ThreadPool},
    snapshot::{FinalSnapshot, SnapshotWriter},
    tile::Tile,
};

/// Tells the driver whether to keep going, e.g. whether the preview window is still open.
pub trait LivenessSignal {
    fn is_open(&self) -> bool;
}

/// Never closes.
#[derive(Copy, Clone, Debug, Default)]
pub struct AlwaysOpen;

impl LivenessSignal for AlwaysOpen {
    fn is_open(&self) -> bool {
        true
    }
}

/// Flag that can be closed from any thread.
#[derive(Clone, Debug)]
pub struct LivenessFlag(Arc<AtomicBool>);

impl LivenessFlag {
    pub fn new() -> Self {
        LivenessFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for LivenessFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessSignal for LivenessFlag {
    fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Closes once the wall clock passes a fixed instant.
#[derive(Copy, Clone, Debug)]
pub struct Deadline(pub Instant);

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Deadline(Instant::now() + limit)
    }
}

impl LivenessSignal for Deadline {
    fn is_open(&self) -> bool {
        Instant::now() < self.0
    }
}

/// Called once per tick, after the idle sleep.
pub trait PreviewStep {
    fn display(&mut self, framebuffer: &Framebuffer, progress: &Progress);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoPreview;

impl PreviewStep for NoPreview {
    fn display(&mut self, _framebuffer: &Framebuffer, _progress: &Progress) {}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DriverState {
    Scheduling,
    /// Schedule is terminal, final snapshot not written yet.
    Finalizing,
    Terminated,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        snapshot: FinalSnapshot,
        failed_tiles: Vec<Tile>,
        elapsed: Duration,
    },
    /// The liveness signal closed before the schedule finished.
    /// The last progress snapshot, if any, is all that was saved.
    Interrupted {
        last_snapshot: Option<PathBuf>,
        progress: Progress,
    },
}

/// Single threaded control loop tying the scheduler, snapshots, preview and liveness together.
pub struct Driver<D: Dispatch> {
    scheduler: Scheduler<D>,
    framebuffer: Arc<Framebuffer>,
    snapshots: SnapshotWriter,
    preview: Box<dyn PreviewStep>,
    liveness: Box<dyn LivenessSignal>,
    idle_interval: Duration,

    state: DriverState,
    started: Instant,
    outcome: Option<RunOutcome>,
}

#[bon]
impl<D: Dispatch> Driver<D> {
    #[builder]
    pub fn new(
        scheduler: Scheduler<D>,
        framebuffer: Arc<Framebuffer>,
        snapshots: SnapshotWriter,
        #[builder(default = Box::new(NoPreview))] preview: Box<dyn PreviewStep>,
        #[builder(default = Box::new(AlwaysOpen))] liveness: Box<dyn LivenessSignal>,
        #[builder(default)] idle_interval: Duration,
    ) -> Self {
        Driver {
            scheduler,
            framebuffer,
            snapshots,
            preview,
            liveness,
            idle_interval,
            state: DriverState::Scheduling,
            started: Instant::now(),
            outcome: None,
        }
    }
}

impl<D: Dispatch> Driver<D> {
    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn scheduler(&self) -> &Scheduler<D> {
        &self.scheduler
    }

    /// One iteration of the control loop.
    ///
    /// A failed progress snapshot is returned as an error after the rest of the tick ran;
    /// the driver stays usable and tries again one interval later. A failed final snapshot
    /// leaves the driver in `Finalizing`, so the next tick retries it.
    pub fn tick(&mut self) -> RenderResult<DriverState> {
        if self.state == DriverState::Terminated {
            return Ok(self.state);
        }

        if !self.liveness.is_open() {
            let dropped = self.scheduler.abort();
            let progress = self.scheduler.progress();
            let longest_running = self.scheduler.longest_running(Instant::now());
            info!(
                dropped,
                abandoned = progress.in_flight,
                finished = progress.finished(),
                longest_running_secs = longest_running.map(|d| d.as_secs_f64()),
                "render interrupted"
            );
            self.outcome = Some(RunOutcome::Interrupted {
                last_snapshot: self.snapshots.last_written().map(ToOwned::to_owned),
                progress,
            });
            self.state = DriverState::Terminated;
            return Ok(self.state);
        }

        self.scheduler.advance();

        if self.scheduler.is_terminal() {
            self.state = DriverState::Finalizing;
            let snapshot = self.snapshots.final_snapshot(&self.framebuffer)?;

            let elapsed = self.started.elapsed();
            let failed_tiles = self.scheduler.failed_tiles().to_vec();
            info!(
                render_secs = elapsed.as_secs_f64(),
                failed = failed_tiles.len(),
                tile_times = %self.scheduler.job_times(),
                "render finished"
            );
            self.outcome = Some(RunOutcome::Completed {
                snapshot,
                failed_tiles,
                elapsed,
            });
            self.state = DriverState::Terminated;
            return Ok(self.state);
        }

        let snapshot = self.snapshots.maybe_snapshot(Instant::now(), &self.framebuffer);

        thread::sleep(self.idle_interval);
        self.preview.display(&self.framebuffer, &self.scheduler.progress());

        snapshot?;
        Ok(self.state)
    }

    /// Ticks until the run completes or is interrupted.
    ///
    /// Progress snapshot failures are logged and the run continues; failing to create the
    /// run directory or to write the final image ends the run with an error.
    pub fn run(mut self) -> RenderResult<RunOutcome> {
        self.snapshots.prepare()?;
        let progress = self.scheduler.progress();
        info!(
            tiles = progress.total,
            workers = self.scheduler.max_workers().get(),
            output = %self.snapshots.layout().dir.display(),
            "render started"
        );

        loop {
            match self.tick() {
                Ok(_) => {}
                Err(RenderError::Snapshot(error)) if self.state == DriverState::Scheduling => {
                    warn!(%error, "progress snapshot failed, retrying after the next interval");
                }
                Err(error) => return Err(error),
            }
            if let Some(outcome) = self.outcome.take() {
                return Ok(outcome);
            }
        }
    }
}

/// Renders a whole canvas as described by `config`, with detached threads running `worker`.
pub fn render<W: RenderWorker>(
    config: &RenderConfig,
    worker: W,
    preview: Box<dyn PreviewStep>,
    liveness: Box<dyn LivenessSignal>,
) -> RenderResult<RunOutcome> {
    config.validate()?;
    let tiles = plan_tiles(config.canvas_size(), config.tile_size())?;
    let framebuffer = Arc::new(Framebuffer::new(config.canvas_size()));
    let pool = ThreadPool::new(Arc::clone(&framebuffer), worker);
    let scheduler = Scheduler::new(pool, tiles, config.worker_budget()?);

    let mut snapshots = SnapshotWriter::new(
        config.layout(),
        config.snapshot_interval()?,
        Instant::now(),
    );
    if config.noise_filter {
        snapshots = snapshots.with_filter(DenoiseFilter::new(config.denoise)?);
    }

    Driver::builder()
        .scheduler(scheduler)
        .framebuffer(framebuffer)
        .snapshots(snapshots)
        .preview(preview)
        .liveness(liveness)
        .idle_interval(config.idle_interval()?)
        .build()
        .run()
}
