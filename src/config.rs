use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    filter::DenoiseParams,
    snapshot::SnapshotLayout,
    tile::ScreenSize,
};

/// Everything a run needs, read once before scheduling starts.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,

    /// Maximum number of tiles rendered at once. Defaults to the number of CPUs.
    pub max_workers: Option<usize>,

    /// Seconds between progress snapshots.
    pub snapshot_interval: f64,
    /// Seconds the control loop sleeps every tick.
    pub idle_interval: f64,

    pub output_dir: PathBuf,
    pub progress_prefix: String,
    pub final_name: String,
    pub filtered_name: String,

    /// Run the denoising filter over the final image.
    pub noise_filter: bool,
    #[serde(flatten)]
    pub denoise: DenoiseParams,

    /// Passed unchanged to the render worker.
    pub render: serde_json::Value,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let layout = SnapshotLayout::new("progress");
        RenderConfig {
            canvas_width: 800,
            canvas_height: 600,
            tile_width: 64,
            tile_height: 64,
            max_workers: None,
            snapshot_interval: 10.0,
            idle_interval: 0.05,
            output_dir: layout.dir,
            progress_prefix: layout.progress_prefix,
            final_name: layout.final_name,
            filtered_name: layout.filtered_name,
            noise_filter: false,
            denoise: DenoiseParams::default(),
            render: serde_json::Value::Null,
        }
    }
}

impl RenderConfig {
    /// Reads and validates a JSON parameter file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: RenderConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(ConfigError::EmptyCanvas {
                width: self.canvas_width,
                height: self.canvas_height,
            });
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(ConfigError::EmptyTile {
                width: self.tile_width,
                height: self.tile_height,
            });
        }
        if self.max_workers == Some(0) {
            return Err(ConfigError::NoWorkers);
        }
        seconds("snapshot_interval", self.snapshot_interval)?;
        seconds("idle_interval", self.idle_interval)?;
        if self.noise_filter {
            self.denoise.validate()?;
        }
        Ok(())
    }

    pub fn canvas_size(&self) -> ScreenSize {
        ScreenSize::new(self.canvas_width, self.canvas_height)
    }

    pub fn tile_size(&self) -> ScreenSize {
        ScreenSize::new(self.tile_width, self.tile_height)
    }

    pub fn worker_budget(&self) -> Result<NonZeroUsize, ConfigError> {
        let count = self.max_workers.unwrap_or_else(num_cpus::get);
        NonZeroUsize::new(count).ok_or(ConfigError::NoWorkers)
    }

    pub fn snapshot_interval(&self) -> Result<Duration, ConfigError> {
        seconds("snapshot_interval", self.snapshot_interval)
    }

    pub fn idle_interval(&self) -> Result<Duration, ConfigError> {
        seconds("idle_interval", self.idle_interval)
    }

    pub fn layout(&self) -> SnapshotLayout {
        SnapshotLayout {
            dir: self.output_dir.clone(),
            progress_prefix: self.progress_prefix.clone(),
            final_name: self.final_name.clone(),
            filtered_name: self.filtered_name.clone(),
        }
    }
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidInterval { name, value })
}
