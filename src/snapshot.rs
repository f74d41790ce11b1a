use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use image::{ImageFormat, RgbImage};
use tracing::info;

use crate::{error::SnapshotError, filter::PostProcessFilter, framebuffer::Framebuffer};

/// Where snapshots of a run go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotLayout {
    pub dir: PathBuf,
    /// Prepended to the zero padded index of progress snapshots.
    pub progress_prefix: String,
    /// Unfiltered final image.
    pub final_name: String,
    /// Final image after post-processing.
    pub filtered_name: String,
}

impl SnapshotLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SnapshotLayout {
            dir: dir.into(),
            progress_prefix: String::new(),
            final_name: "final.png".into(),
            filtered_name: "final-denoised.png".into(),
        }
    }

    pub fn progress_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{}{:02}.png", self.progress_prefix, index))
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join(&self.final_name)
    }

    pub fn filtered_path(&self) -> PathBuf {
        self.dir.join(&self.filtered_name)
    }
}

/// Files written when a run completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalSnapshot {
    pub path: PathBuf,
    pub filtered: Option<PathBuf>,
}

/// Writes numbered progress snapshots at most once per interval, and the final image.
///
/// The framebuffer lock is only held while copying the pixels, never during file I/O.
pub struct SnapshotWriter {
    layout: SnapshotLayout,
    interval: Duration,
    last_snapshot: Instant,
    next_index: u32,
    last_written: Option<PathBuf>,
    filter: Option<Box<dyn PostProcessFilter>>,
}

impl SnapshotWriter {
    /// `started` counts as the time of the previous snapshot.
    pub fn new(layout: SnapshotLayout, interval: Duration, started: Instant) -> Self {
        SnapshotWriter {
            layout,
            interval,
            last_snapshot: started,
            next_index: 1,
            last_written: None,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl PostProcessFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn layout(&self) -> &SnapshotLayout {
        &self.layout
    }

    /// Creates the run directory.
    pub fn prepare(&self) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.layout.dir).map_err(|source| SnapshotError::CreateDir {
            path: self.layout.dir.clone(),
            source,
        })
    }

    /// More than one interval has passed since the previous progress snapshot.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_snapshot) > self.interval
    }

    /// Writes the next progress snapshot if it is due.
    ///
    /// A failed write doesn't consume an index, but still restarts the interval, so the next
    /// attempt happens one interval later.
    pub fn maybe_snapshot(
        &mut self,
        now: Instant,
        framebuffer: &Framebuffer,
    ) -> Result<Option<PathBuf>, SnapshotError> {
        if !self.is_due(now) {
            return Ok(None);
        }
        self.last_snapshot = now;

        let image = framebuffer.snapshot();
        let path = self.layout.progress_path(self.next_index);
        save(&image, &path)?;
        info!(path = %path.display(), "progress snapshot written");

        self.next_index += 1;
        self.last_written = Some(path.clone());
        Ok(Some(path))
    }

    /// Writes the final image, then runs the post-process filter on it, if there is one.
    pub fn final_snapshot(
        &mut self,
        framebuffer: &Framebuffer,
    ) -> Result<FinalSnapshot, SnapshotError> {
        let image = framebuffer.snapshot();
        let path = self.layout.final_path();
        save(&image, &path)?;
        info!(path = %path.display(), "final image written");
        self.last_written = Some(path.clone());

        let filtered = match &self.filter {
            Some(filter) => {
                let output = self.layout.filtered_path();
                filter
                    .filter(&path, &output)
                    .map_err(|source| SnapshotError::Filter {
                        input: path.clone(),
                        source,
                    })?;
                info!(path = %output.display(), "filtered image written");
                Some(output)
            }
            None => None,
        };

        Ok(FinalSnapshot { path, filtered })
    }

    /// Most recent file successfully written by this writer.
    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }

    /// Number of progress snapshots written so far.
    pub fn progress_count(&self) -> u32 {
        self.next_index - 1
    }
}

fn save(image: &RgbImage, path: &Path) -> Result<(), SnapshotError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| SnapshotError::Write {
            path: path.to_owned(),
            source,
        })
}
