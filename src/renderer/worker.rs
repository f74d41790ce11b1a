use std::{num::NonZeroU32, time::Duration};

use anyhow::Context as _;
use image::RgbImage;
use rand::{Rng as _, SeedableRng, rngs::SmallRng};
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, framebuffer::TileCanvas, tile::ScreenPoint, util::Rgb};

/// Computes the pixels of one tile.
///
/// Called concurrently from several threads, each call with a different, non-overlapping
/// tile. Implementations must return in finite time; errors and panics only mark the tile
/// as failed.
pub trait RenderWorker: Send + Sync + 'static {
    fn render(&self, canvas: &TileCanvas) -> anyhow::Result<()>;
}

impl<F> RenderWorker for F
where
    F: Fn(&TileCanvas) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn render(&self, canvas: &TileCanvas) -> anyhow::Result<()> {
        self(canvas)
    }
}

/// Parameters of [`NoiseWorker`], read from the `render` section of the config.
#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NoiseParams {
    pub sample_count: NonZeroU32,
    /// Standard deviation of the per-sample noise.
    pub noise: f32,
    /// Fixed seed for reproducible output. Each tile derives its own stream from it.
    pub seed: Option<u64>,
    /// Artificial delay per tile, in milliseconds.
    pub delay_ms: u64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        NoiseParams {
            sample_count: NonZeroU32::MIN.saturating_add(15),
            noise: 0.2,
            seed: None,
            delay_ms: 0,
        }
    }
}

/// Stand-in renderer: a smooth gradient over the canvas, shaded with Monte Carlo style noise
/// that averages out with more samples.
#[derive(Clone, Debug)]
pub struct NoiseWorker {
    params: NoiseParams,
    distribution: Normal<f32>,
}

impl NoiseWorker {
    pub fn new(params: NoiseParams) -> Result<Self, ConfigError> {
        if !params.noise.is_finite() {
            return Err(ConfigError::InvalidNoise(params.noise));
        }
        let distribution = Normal::new(0.0, params.noise)
            .map_err(|_| ConfigError::InvalidNoise(params.noise))?;
        Ok(NoiseWorker {
            params,
            distribution,
        })
    }

    /// Builds the worker from the opaque `render` config section. `null` means defaults.
    pub fn from_params(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let params = if value.is_null() {
            NoiseParams::default()
        } else {
            NoiseParams::deserialize(value).map_err(ConfigError::RenderParams)?
        };
        Self::new(params)
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    fn rng_for(&self, origin: ScreenPoint) -> SmallRng {
        match self.params.seed {
            Some(seed) => {
                let position = (origin.x as u64) << 32 | origin.y as u64;
                SmallRng::seed_from_u64(seed ^ position.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            }
            None => SmallRng::from_os_rng(),
        }
    }

    fn render_sample(
        &self,
        point: ScreenPoint,
        canvas_size: (f32, f32),
        rng: &mut SmallRng,
    ) -> Rgb {
        let u = (point.x as f32 + rng.random_range(0.0..1.0)) / canvas_size.0;
        let v = (point.y as f32 + rng.random_range(0.0..1.0)) / canvas_size.1;
        let base = Rgb::new(u, v, 1.0 - 0.5 * (u + v));
        let noise = Rgb::new(
            self.distribution.sample(rng),
            self.distribution.sample(rng),
            self.distribution.sample(rng),
        );
        base + noise
    }
}

impl RenderWorker for NoiseWorker {
    fn render(&self, canvas: &TileCanvas) -> anyhow::Result<()> {
        let tile = canvas.tile();
        let canvas_size = canvas.canvas_size().cast::<f32>();
        let mut rng = self.rng_for(tile.origin);
        let mut buffer = RgbImage::new(tile.width(), tile.height());

        for point in tile.internal_points() {
            let mut pixel_sum = Rgb::new(0.0, 0.0, 0.0);
            for _i in 0..self.params.sample_count.get() {
                pixel_sum += self.render_sample(point, (canvas_size.x, canvas_size.y), &mut rng);
            }
            let pixel = pixel_sum * (1.0 / self.params.sample_count.get() as f32);

            let buffer_position = point - tile.origin;
            buffer.put_pixel(buffer_position.x, buffer_position.y, color_to_image(pixel));
        }

        if self.params.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.params.delay_ms));
        }

        canvas
            .write(&buffer)
            .with_context(|| format!("storing tile at {:?}", tile.origin))
    }
}

/// Maps a 0-1 f32 rgb pixel to pixel type compatible with module image.
pub fn color_to_image(color: Rgb) -> image::Rgb<u8> {
    image::Rgb([
        (color.r * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.g * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.b * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        framebuffer::{Framebuffer, SENTINEL},
        tile::{ScreenSize, Tile},
    };
    use assert2::assert;
    use test_case::test_case;

    #[test_case(Rgb::new(0.0, 0.5, 1.0), [0, 128, 255] ; "in range")]
    #[test_case(Rgb::new(-1.0, 2.0, 0.2), [0, 255, 51] ; "clamped")]
    fn color_conversion(color: Rgb, expected: [u8; 3]) {
        assert!(color_to_image(color) == image::Rgb(expected));
    }

    #[test]
    fn renders_whole_tile() {
        let fb = Arc::new(Framebuffer::new(ScreenSize::new(32, 32)));
        let tile = Tile::new(ScreenPoint::new(8, 8), ScreenSize::new(16, 8));
        let worker = NoiseWorker::new(NoiseParams {
            noise: 0.0,
            ..Default::default()
        })
        .unwrap();

        worker.render(&fb.claim(tile).unwrap()).unwrap();

        let snapshot = fb.snapshot();
        let rendered = snapshot
            .enumerate_pixels()
            .filter(|(x, y, px)| tile.contains(ScreenPoint::new(*x, *y)) && px.0 != [SENTINEL; 3])
            .count();
        assert!(rendered == tile.area() as usize);
        let untouched = snapshot
            .enumerate_pixels()
            .filter(|(x, y, _)| !tile.contains(ScreenPoint::new(*x, *y)))
            .all(|(_, _, px)| px.0 == [SENTINEL; 3]);
        assert!(untouched);
    }

    #[test]
    fn seeded_output_is_reproducible() {
        let params = NoiseParams {
            seed: Some(42),
            ..Default::default()
        };
        let worker = NoiseWorker::new(params).unwrap();
        let tile = Tile::new(ScreenPoint::new(0, 0), ScreenSize::new(8, 8));

        let render = || {
            let fb = Arc::new(Framebuffer::new(ScreenSize::new(8, 8)));
            worker.render(&fb.claim(tile).unwrap()).unwrap();
            fb.snapshot()
        };
        assert!(render().as_raw() == render().as_raw());
    }

    #[test]
    fn params_from_json() {
        let value = serde_json::json!({ "sample_count": 4, "seed": 7 });
        let worker = NoiseWorker::from_params(&value).unwrap();
        assert!(worker.params().sample_count.get() == 4);
        assert!(worker.params().seed == Some(7));
        assert!(worker.params().delay_ms == 0);

        let defaults = NoiseWorker::from_params(&serde_json::Value::Null).unwrap();
        assert!(defaults.params().sample_count.get() == 16);
    }

    #[test]
    fn bad_render_params_are_config_errors() {
        let value = serde_json::json!({ "sample_count": 0 });
        assert!(let Err(ConfigError::RenderParams(_)) = NoiseWorker::from_params(&value));
    }

    #[test_case(f32::NAN ; "nan")]
    #[test_case(f32::INFINITY ; "infinite")]
    #[test_case(-0.5 ; "negative")]
    fn bad_noise_is_rejected(noise: f32) {
        let params = NoiseParams {
            noise,
            ..Default::default()
        };
        assert!(let Err(ConfigError::InvalidNoise(_)) = NoiseWorker::new(params));
    }
}
