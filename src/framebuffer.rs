use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{GenericImage as _, Rgb, RgbImage};

use crate::{
    error::FramebufferError,
    tile::{ScreenSize, Tile},
};

/// Value every channel of the framebuffer holds before a tile is written over it.
pub const SENTINEL: u8 = 255;

/// Shared RGB output image.
///
/// All pixel access goes through one lock, held only for the duration of a copy.
/// Workers get write access through a [`TileCanvas`], which can only be obtained for a
/// region that doesn't overlap any other region currently checked out, so concurrent
/// writers never touch the same pixels.
pub struct Framebuffer {
    size: ScreenSize,
    state: Mutex<State>,
}

struct State {
    image: RgbImage,
    claims: Vec<Tile>,
}

impl Framebuffer {
    pub fn new(size: ScreenSize) -> Self {
        Framebuffer {
            size,
            state: Mutex::new(State {
                image: RgbImage::from_pixel(size.x, size.y, Rgb([SENTINEL; 3])),
                claims: Vec::new(),
            }),
        }
    }

    pub fn size(&self) -> ScreenSize {
        self.size
    }

    /// Checks out a region for writing.
    /// Fails if the tile doesn't fit the canvas or overlaps a region that is still checked out.
    /// The region is released when the returned canvas is dropped.
    pub fn claim(self: &Arc<Self>, tile: Tile) -> Result<TileCanvas, FramebufferError> {
        if !Tile::from_size(self.size).contains_tile(&tile) {
            return Err(FramebufferError::OutOfBounds {
                tile,
                width: self.size.x,
                height: self.size.y,
            });
        }

        let mut state = self.lock();
        if let Some(other) = state.claims.iter().find(|other| other.overlaps(&tile)) {
            return Err(FramebufferError::Overlap {
                tile,
                other: *other,
            });
        }
        state.claims.push(tile);

        Ok(TileCanvas {
            framebuffer: Arc::clone(self),
            tile,
        })
    }

    /// Copy of the current pixels.
    pub fn snapshot(&self) -> RgbImage {
        self.lock().image.clone()
    }

    /// Number of regions currently checked out.
    pub fn active_claims(&self) -> usize {
        self.lock().claims.len()
    }

    fn write(&self, tile: Tile, pixels: &RgbImage) -> Result<(), FramebufferError> {
        self.lock()
            .image
            .copy_from(pixels, tile.origin.x, tile.origin.y)
            .map_err(|_| FramebufferError::OutOfBounds {
                tile,
                width: self.size.x,
                height: self.size.y,
            })
    }

    fn release(&self, tile: &Tile) {
        let mut state = self.lock();
        if let Some(index) = state.claims.iter().position(|claim| claim == tile) {
            state.claims.swap_remove(index);
        }
    }

    /// A worker that panicked mid-copy leaves at worst a partially written tile behind,
    /// so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive write access to one tile of a [`Framebuffer`].
pub struct TileCanvas {
    framebuffer: Arc<Framebuffer>,
    tile: Tile,
}

impl TileCanvas {
    pub fn tile(&self) -> Tile {
        self.tile
    }

    /// Size of the whole canvas this tile belongs to.
    pub fn canvas_size(&self) -> ScreenSize {
        self.framebuffer.size()
    }

    /// Copies a tile sized image into the framebuffer.
    pub fn write(&self, pixels: &RgbImage) -> Result<(), FramebufferError> {
        if pixels.dimensions() != (self.tile.width(), self.tile.height()) {
            return Err(FramebufferError::SizeMismatch {
                tile: self.tile,
                width: pixels.width(),
                height: pixels.height(),
            });
        }
        self.framebuffer.write(self.tile, pixels)
    }
}

impl Drop for TileCanvas {
    fn drop(&mut self) {
        self.framebuffer.release(&self.tile);
    }
}
