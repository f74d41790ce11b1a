mod stats;

pub use stats::DurationStats;

pub type Rgb = rgb::RGB<f32>;
