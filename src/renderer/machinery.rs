use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use core_affinity::CoreId;
use crossbeam_channel::{Receiver, TryRecvError};

use crate::{
    error::JobFailure,
    framebuffer::Framebuffer,
    renderer::worker::RenderWorker,
    tile::Tile,
};

pub type JobOutcome = Result<(), JobFailure>;

#[derive(Debug)]
pub enum JobStatus {
    Pending,
    Done(JobOutcome),
}

/// Starts jobs without waiting for them.
pub trait Dispatch {
    type Handle: JobHandle;

    fn submit(&mut self, tile: Tile) -> Self::Handle;
}

/// Non-blocking view of a running job.
pub trait JobHandle {
    /// Never blocks. Reports `Done` once, after which the handle is spent.
    fn poll(&mut self) -> JobStatus;
}

/// Runs every job on its own detached thread, pinned round robin to the available cores.
///
/// The threads are never joined; completion is observed through a one-shot channel.
/// Threads still running when the pool is dropped finish their tile into a framebuffer
/// nobody reads anymore.
pub struct ThreadPool<W: RenderWorker> {
    framebuffer: Arc<Framebuffer>,
    worker: Arc<W>,
    cores: Vec<CoreId>,
    next_core: usize,
}

impl<W: RenderWorker> ThreadPool<W> {
    pub fn new(framebuffer: Arc<Framebuffer>, worker: W) -> Self {
        ThreadPool {
            framebuffer,
            worker: Arc::new(worker),
            cores: core_affinity::get_core_ids().unwrap_or_default(),
            next_core: 0,
        }
    }

    fn next_core(&mut self) -> Option<CoreId> {
        if self.cores.is_empty() {
            return None;
        }
        let core = self.cores[self.next_core % self.cores.len()];
        self.next_core = self.next_core.wrapping_add(1);
        Some(core)
    }
}

impl<W: RenderWorker> Dispatch for ThreadPool<W> {
    type Handle = ThreadJob;

    fn submit(&mut self, tile: Tile) -> ThreadJob {
        let canvas = match self.framebuffer.claim(tile) {
            Ok(canvas) => canvas,
            Err(err) => return ThreadJob::finished(Err(err.into())),
        };
        let worker = Arc::clone(&self.worker);
        let core = self.next_core();
        let (sender, receiver) = crossbeam_channel::bounded(1);

        let spawned = thread::Builder::new()
            .name(format!("tile-{}-{}", tile.origin.x, tile.origin.y))
            .spawn(move || {
                if let Some(core) = core {
                    core_affinity::set_for_current(core);
                }

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.render(&canvas)))
                    .map_err(|_| JobFailure::Panicked)
                    .and_then(|result| result.map_err(JobFailure::Worker));
                drop(canvas);

                // Nobody listens anymore if the run was abandoned.
                let _ = sender.send(outcome);
            });

        match spawned {
            Ok(_detached) => ThreadJob::Running(receiver),
            Err(source) => ThreadJob::finished(Err(JobFailure::Spawn(source))),
        }
    }
}

pub enum ThreadJob {
    Running(Receiver<JobOutcome>),
    Finished(Option<JobOutcome>),
}

impl ThreadJob {
    fn finished(outcome: JobOutcome) -> Self {
        ThreadJob::Finished(Some(outcome))
    }
}

impl JobHandle for ThreadJob {
    fn poll(&mut self) -> JobStatus {
        match self {
            ThreadJob::Running(receiver) => {
                let outcome = match receiver.try_recv() {
                    Ok(outcome) => outcome,
                    Err(TryRecvError::Empty) => return JobStatus::Pending,
                    // The sender only goes away without sending if the thread died.
                    Err(TryRecvError::Disconnected) => Err(JobFailure::Panicked),
                };
                *self = ThreadJob::Finished(None);
                JobStatus::Done(outcome)
            }
            ThreadJob::Finished(outcome) => {
                JobStatus::Done(outcome.take().unwrap_or(Err(JobFailure::Panicked)))
            }
        }
    }
}
