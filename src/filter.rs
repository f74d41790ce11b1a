use std::path::Path;

use anyhow::Context as _;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Post-processing step run on the final image file.
pub trait PostProcessFilter: Send {
    fn filter(&self, input: &Path, output: &Path) -> anyhow::Result<()>;
}

impl<F> PostProcessFilter for F
where
    F: Fn(&Path, &Path) -> anyhow::Result<()> + Send,
{
    fn filter(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        self(input, output)
    }
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DenoiseParams {
    /// Filter strength. Larger values remove more noise, and more detail with it.
    pub noise_sigma: f32,
    /// Side of the square patch compared between pixels. Odd.
    pub template_window_size: u32,
    /// Side of the square area searched for similar patches. Odd.
    pub search_window_size: u32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        DenoiseParams {
            noise_sigma: 3.0,
            template_window_size: 7,
            search_window_size: 21,
        }
    }
}

impl DenoiseParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.noise_sigma.is_finite() || self.noise_sigma <= 0.0 {
            return Err(ConfigError::filter(format!(
                "noise_sigma must be positive, got {}",
                self.noise_sigma
            )));
        }
        for (name, size) in [
            ("template_window_size", self.template_window_size),
            ("search_window_size", self.search_window_size),
        ] {
            if size % 2 == 0 {
                return Err(ConfigError::filter(format!("{name} must be odd, got {size}")));
            }
        }
        Ok(())
    }
}

/// Non-local means denoising.
///
/// Every output pixel is a weighted mean of the pixels in its search window, weighted by how
/// similar the patch around each candidate is to the patch around the pixel itself.
/// Rows are split between scoped threads.
#[derive(Clone, Debug)]
pub struct DenoiseFilter {
    params: DenoiseParams,
    threads: usize,
}

impl DenoiseFilter {
    pub fn new(params: DenoiseParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(DenoiseFilter {
            params,
            threads: num_cpus::get(),
        })
    }

    pub fn params(&self) -> &DenoiseParams {
        &self.params
    }

    pub fn denoise(&self, image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let mut output = RgbImage::new(width, height);
        if width == 0 || height == 0 {
            return output;
        }

        let source = Planar::new(image);
        let row_len = width as usize * 3;
        let rows_per_chunk = (height as usize).div_ceil(self.threads.max(1));

        std::thread::scope(|scope| {
            for (chunk_index, chunk) in output.chunks_mut(row_len * rows_per_chunk).enumerate() {
                let source = &source;
                let params = &self.params;
                scope.spawn(move || {
                    let first_row = chunk_index * rows_per_chunk;
                    for (row_offset, row) in chunk.chunks_mut(row_len).enumerate() {
                        let y = (first_row + row_offset) as i64;
                        for (x, pixel) in row.chunks_mut(3).enumerate() {
                            pixel.copy_from_slice(&denoise_pixel(source, params, x as i64, y));
                        }
                    }
                });
            }
        });

        output
    }
}

impl PostProcessFilter for DenoiseFilter {
    fn filter(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        let image = image::open(input)
            .with_context(|| format!("opening '{}'", input.display()))?
            .to_rgb8();
        self.denoise(&image)
            .save(output)
            .with_context(|| format!("writing '{}'", output.display()))?;
        Ok(())
    }
}

/// f32 copy of the image with clamped coordinate access.
struct Planar {
    width: i64,
    height: i64,
    data: Vec<[f32; 3]>,
}

impl Planar {
    fn new(image: &RgbImage) -> Self {
        Planar {
            width: image.width() as i64,
            height: image.height() as i64,
            data: image
                .pixels()
                .map(|p| [p.0[0] as f32, p.0[1] as f32, p.0[2] as f32])
                .collect(),
        }
    }

    fn get(&self, x: i64, y: i64) -> [f32; 3] {
        let x = x.clamp(0, self.width - 1);
        let y = y.clamp(0, self.height - 1);
        self.data[(x + y * self.width) as usize]
    }
}

fn denoise_pixel(source: &Planar, params: &DenoiseParams, x: i64, y: i64) -> [u8; 3] {
    let template_radius = (params.template_window_size / 2) as i64;
    let search_radius = (params.search_window_size / 2) as i64;
    let h2 = params.noise_sigma * params.noise_sigma;
    let patch_len = ((2 * template_radius + 1) * (2 * template_radius + 1) * 3) as f32;

    let mut weight_sum = 0.0f32;
    let mut color_sum = [0.0f32; 3];

    for sy in (y - search_radius).max(0)..=(y + search_radius).min(source.height - 1) {
        for sx in (x - search_radius).max(0)..=(x + search_radius).min(source.width - 1) {
            let mut distance = 0.0f32;
            for ty in -template_radius..=template_radius {
                for tx in -template_radius..=template_radius {
                    let a = source.get(x + tx, y + ty);
                    let b = source.get(sx + tx, sy + ty);
                    distance += (0..3).map(|c| (a[c] - b[c]) * (a[c] - b[c])).sum::<f32>();
                }
            }
            let weight = (-(distance / patch_len) / h2).exp();

            let candidate = source.get(sx, sy);
            for c in 0..3 {
                color_sum[c] += weight * candidate[c];
            }
            weight_sum += weight;
        }
    }

    // The pixel itself always has weight 1, so the sum is never zero.
    color_sum.map(|v| (v / weight_sum).round().clamp(0.0, 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::scratch_dir;
    use assert2::assert;
    use image::Rgb;
    use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};
    use test_case::test_case;

    fn small_params() -> DenoiseParams {
        DenoiseParams {
            noise_sigma: 20.0,
            template_window_size: 3,
            search_window_size: 7,
        }
    }

    fn variance(image: &RgbImage) -> f64 {
        let values: Vec<f64> = image.as_raw().iter().map(|&v| v as f64).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn flat_image_is_unchanged() {
        let image = RgbImage::from_pixel(17, 9, Rgb([40, 120, 200]));
        let filter = DenoiseFilter::new(small_params()).unwrap();
        assert!(filter.denoise(&image) == image);
    }

    #[test]
    fn noise_is_reduced() {
        let mut rng = SmallRng::seed_from_u64(1);
        let image = RgbImage::from_fn(24, 24, |_, _| {
            let v = 128 + rng.random_range(-30i32..=30);
            Rgb([v as u8; 3])
        });
        let filter = DenoiseFilter::new(small_params()).unwrap();
        let filtered = filter.denoise(&image);

        assert!(filtered.dimensions() == image.dimensions());
        assert!(variance(&filtered) < variance(&image) / 2.0);
    }

    #[test]
    fn filters_files() {
        let dir = scratch_dir("denoise");
        let input = dir.join("in.png");
        let output = dir.join("out.png");
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])).save(&input).unwrap();

        let filter = DenoiseFilter::new(small_params()).unwrap();
        filter.filter(&input, &output).unwrap();

        let result = image::open(&output).unwrap().to_rgb8();
        assert!(result == RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])));
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = scratch_dir("denoise-missing");
        let filter = DenoiseFilter::new(small_params()).unwrap();
        let result = filter.filter(&dir.join("nope.png"), &dir.join("out.png"));
        assert!(let Err(_) = result);
    }

    #[test_case(0.0, 7, 21 ; "zero sigma")]
    #[test_case(f32::NAN, 7, 21 ; "nan sigma")]
    #[test_case(3.0, 6, 21 ; "even template")]
    #[test_case(3.0, 7, 20 ; "even search")]
    fn invalid_params(noise_sigma: f32, template_window_size: u32, search_window_size: u32) {
        let params = DenoiseParams {
            noise_sigma,
            template_window_size,
            search_window_size,
        };
        assert!(let Err(ConfigError::Filter(_)) = DenoiseFilter::new(params));
    }
}
