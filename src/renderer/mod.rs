mod machinery;
mod scheduler;
mod worker;

pub use machinery::{Dispatch, JobHandle, JobOutcome, JobStatus, ThreadJob, ThreadPool};
pub use scheduler::{Advance, JobState, Progress, Scheduler};
pub use worker::{NoiseParams, NoiseWorker, RenderWorker, color_to_image};
