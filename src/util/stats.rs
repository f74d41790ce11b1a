use std::{fmt::Display, time::Duration};

/// Running min / max / mean of job durations.
#[derive(Clone, Debug, PartialEq)]
pub struct DurationStats {
    pub count: usize,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
}

impl DurationStats {
    pub fn add_sample(&mut self, value: Duration) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let mean = self.mean.as_secs_f64();
        self.mean =
            Duration::from_secs_f64(mean + (value.as_secs_f64() - mean) / (self.count as f64));
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for DurationStats {
    fn default() -> Self {
        DurationStats {
            count: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            mean: Duration::ZERO,
        }
    }
}

impl Display for DurationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "no samples");
        }
        write!(
            f,
            "{:.3}s - {:.3}s; avg {:.3}s; {} samples",
            self.min.as_secs_f64(),
            self.max.as_secs_f64(),
            self.mean.as_secs_f64(),
            self.count
        )
    }
}
