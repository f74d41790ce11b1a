use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{
    renderer::machinery::{Dispatch, JobHandle, JobStatus},
    tile::Tile,
    util::DurationStats,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Queued, not dispatched yet.
    Pending,
    Running,
    Done,
    Failed,
}

struct Job<H> {
    tile: Tile,
    handle: H,
    started: Instant,
}

/// What happened during one [`Scheduler::advance`] call.
#[derive(Clone, Debug, Default)]
pub struct Advance {
    /// Jobs that finished, with their final state, in the order they were observed.
    pub finished: Vec<(Tile, JobState)>,
    /// Tiles started during this call, in queue order.
    pub dispatched: Vec<Tile>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub queued: usize,
}

impl Progress {
    /// Tiles that won't be worked on anymore, successfully or not.
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * (self.finished() as f32) / (self.total as f32)
        }
    }
}

/// Feeds a FIFO queue of tiles to a dispatcher, keeping at most `max_workers` jobs in flight.
///
/// Jobs are polled, never waited for; a failed job is recorded and its tile is not retried.
pub struct Scheduler<D: Dispatch> {
    dispatch: D,
    max_workers: NonZeroUsize,

    queue: VecDeque<Tile>,
    in_flight: Vec<Job<D::Handle>>,

    total: usize,
    succeeded: usize,
    failed: Vec<Tile>,
    job_times: DurationStats,
}

impl<D: Dispatch> Scheduler<D> {
    pub fn new(
        dispatch: D,
        tiles: impl IntoIterator<Item = Tile>,
        max_workers: NonZeroUsize,
    ) -> Self {
        let queue: VecDeque<Tile> = tiles.into_iter().collect();
        Scheduler {
            dispatch,
            max_workers,
            total: queue.len(),
            queue,
            in_flight: Vec::new(),
            succeeded: 0,
            failed: Vec::new(),
            job_times: DurationStats::default(),
        }
    }

    /// Collects finished jobs, then tops the in-flight set up from the head of the queue.
    pub fn advance(&mut self) -> Advance {
        let mut report = Advance::default();
        let now = Instant::now();

        let Self {
            in_flight,
            succeeded,
            failed,
            job_times,
            ..
        } = self;
        in_flight.retain_mut(|job| {
            let outcome = match job.handle.poll() {
                JobStatus::Pending => return true,
                JobStatus::Done(outcome) => outcome,
            };
            let elapsed = now.saturating_duration_since(job.started);
            job_times.add_sample(elapsed);

            let tile = job.tile;
            match outcome {
                Ok(()) => {
                    debug!(
                        x = tile.origin.x,
                        y = tile.origin.y,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "tile finished"
                    );
                    *succeeded += 1;
                    report.finished.push((tile, JobState::Done));
                }
                Err(error) => {
                    warn!(
                        x = tile.origin.x,
                        y = tile.origin.y,
                        width = tile.width(),
                        height = tile.height(),
                        %error,
                        "tile failed, leaving it unrendered"
                    );
                    failed.push(tile);
                    report.finished.push((tile, JobState::Failed));
                }
            }
            false
        });

        while self.in_flight.len() < self.max_workers.get() {
            let Some(tile) = self.queue.pop_front() else {
                break;
            };
            let handle = self.dispatch.submit(tile);
            debug!(
                x = tile.origin.x,
                y = tile.origin.y,
                width = tile.width(),
                height = tile.height(),
                "tile dispatched"
            );
            self.in_flight.push(Job {
                tile,
                handle,
                started: Instant::now(),
            });
            report.dispatched.push(tile);
        }

        debug_assert!(self.in_flight.len() <= self.max_workers.get());
        report
    }

    /// No tile is queued or in flight.
    pub fn is_terminal(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Drops every tile that hasn't been dispatched yet. Jobs already in flight are left to
    /// run. Returns the number of dropped tiles.
    pub fn abort(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed.len(),
            in_flight: self.in_flight.len(),
            queued: self.queue.len(),
        }
    }

    /// Tiles that are queued or running, with their state.
    pub fn jobs(&self) -> impl Iterator<Item = (Tile, JobState)> + '_ {
        self.in_flight
            .iter()
            .map(|job| (job.tile, JobState::Running))
            .chain(self.queue.iter().map(|tile| (*tile, JobState::Pending)))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn max_workers(&self) -> NonZeroUsize {
        self.max_workers
    }

    pub fn failed_tiles(&self) -> &[Tile] {
        &self.failed
    }

    pub fn job_times(&self) -> &DurationStats {
        &self.job_times
    }

    /// Longest time any job currently in flight has been running.
    pub fn longest_running(&self, now: Instant) -> Option<Duration> {
        self.in_flight
            .iter()
            .map(|job| now.saturating_duration_since(job.started))
            .max()
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatch
    }
}
