pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod framebuffer;
pub mod planner;
pub mod renderer;
pub mod snapshot;
pub mod tile;
mod util;

pub use config::RenderConfig;
pub use driver::{
    AlwaysOpen, Deadline, Driver, DriverState, LivenessFlag, LivenessSignal, NoPreview,
    PreviewStep, RunOutcome, render,
};
pub use error::{ConfigError, RenderError, RenderResult};
pub use filter::{DenoiseFilter, DenoiseParams, PostProcessFilter};
pub use framebuffer::{Framebuffer, TileCanvas};
pub use planner::plan_tiles;
pub use renderer::{NoiseParams, NoiseWorker, Progress, RenderWorker, Scheduler, ThreadPool};
pub use snapshot::{FinalSnapshot, SnapshotLayout, SnapshotWriter};
pub use tile::{ScreenPoint, ScreenSize, Tile};
pub use util::{DurationStats, Rgb};

#[cfg(test)]
pub(crate) mod test_util {
    use std::{
        fs,
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Fresh, empty directory under the system temp dir.
    pub fn scratch_dir(name: &str) -> PathBuf {
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "tilepath-{}-{name}-{unique}",
            std::process::id()
        ));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
