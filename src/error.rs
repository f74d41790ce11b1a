use std::path::PathBuf;

use crate::tile::Tile;

/// Invalid configuration. Always detected before any tile is scheduled.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("canvas size must be non-zero, got {width}x{height}")]
    EmptyCanvas { width: u32, height: u32 },

    #[error("tile size must be non-zero, got {width}x{height}")]
    EmptyTile { width: u32, height: u32 },

    #[error("worker budget must be at least 1")]
    NoWorkers,

    #[error("{name} must be a finite, non-negative number of seconds, got {value}")]
    InvalidInterval { name: &'static str, value: f64 },

    #[error("invalid filter parameter: {0}")]
    Filter(String),

    #[error("invalid render parameters")]
    RenderParams(#[source] serde_json::Error),

    #[error("noise must be a finite, non-negative number, got {0}")]
    InvalidNoise(f32),

    #[error("failed to read config file '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}'", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FramebufferError {
    #[error("tile {tile:?} does not fit into the {width}x{height} canvas")]
    OutOfBounds { tile: Tile, width: u32, height: u32 },

    #[error("tile {tile:?} overlaps tile {other:?} that is still being rendered")]
    Overlap { tile: Tile, other: Tile },

    #[error("pixel data is {width}x{height}, but tile {tile:?} needs its exact size")]
    SizeMismatch { tile: Tile, width: u32, height: u32 },
}

/// Why a single tile ended up unrendered. Never fatal to the run.
#[derive(thiserror::Error, Debug)]
pub enum JobFailure {
    #[error("render worker failed: {0:#}")]
    Worker(anyhow::Error),

    #[error("render worker panicked")]
    Panicked,

    #[error("failed to start worker thread")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("failed to create run directory '{}'", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot '{}'", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("post-process filter failed on '{}'", .input.display())]
    Filter {
        input: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{ScreenPoint, ScreenSize};
    use assert2::assert;

    #[test]
    fn messages_carry_context() {
        let tile = Tile::new(ScreenPoint::new(90, 0), ScreenSize::new(20, 10));
        let err = FramebufferError::OutOfBounds {
            tile,
            width: 100,
            height: 100,
        };
        assert!(err.to_string().contains("100x100"));

        let err = ConfigError::EmptyTile {
            width: 0,
            height: 16,
        };
        assert!(err.to_string().contains("0x16"));
    }

    #[test]
    fn job_failure_keeps_worker_context() {
        let err = anyhow::anyhow!("disk on fire").context("shading tile");
        let failure = JobFailure::Worker(err);
        let msg = failure.to_string();
        assert!(msg.contains("shading tile"));
        assert!(msg.contains("disk on fire"));
    }

    #[test]
    fn render_error_is_transparent() {
        let err: RenderError = ConfigError::NoWorkers.into();
        assert!(err.to_string() == "worker budget must be at least 1");
    }
}
