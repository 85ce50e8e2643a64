//! Core statistical operations
//!
//! Every reduction in the crate goes through [`CellStats`]: one pass over
//! the values of a cell, skipping NaN, accumulating in `f64`.

/// Statistics computed across models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOperation {
    /// Arithmetic mean
    Mean,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Population standard deviation
    Std,
}

impl StatOperation {
    /// Every operation, in persisted order
    pub const ALL: [Self; 4] = [Self::Mean, Self::Min, Self::Max, Self::Std];

    /// Field name used in stores
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
        }
    }
}

/// Mean, min, max and population std of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellStats {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub std: f32,
}

impl CellStats {
    /// Result for a cell with no valid value
    pub const MISSING: Self = Self {
        mean: f32::NAN,
        min: f32::NAN,
        max: f32::NAN,
        std: f32::NAN,
    };

    /// NaN-aware statistics of `values`
    ///
    /// Uses Welford's update so the variance never goes negative.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let mut count = 0_u32;
        let mut mean = 0.0_f64;
        let mut m2 = 0.0_f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values {
            if value.is_nan() {
                continue;
            }
            let x = f64::from(value);
            count += 1;
            let delta = x - mean;
            mean += delta / f64::from(count);
            m2 += delta * (x - mean);
            min = min.min(x);
            max = max.max(x);
        }

        if count == 0 {
            return Self::MISSING;
        }

        #[allow(clippy::cast_possible_truncation)]
        Self {
            mean: mean as f32,
            min: min as f32,
            max: max as f32,
            std: (m2 / f64::from(count)).max(0.0).sqrt() as f32,
        }
    }

    #[must_use]
    pub fn get(&self, operation: StatOperation) -> f32 {
        match operation {
            StatOperation::Mean => self.mean,
            StatOperation::Min => self.min,
            StatOperation::Max => self.max,
            StatOperation::Std => self.std,
        }
    }
}

/// NaN-aware arithmetic mean, `NaN` if nothing is valid
pub fn nan_mean<I>(values: I) -> f32
where
    I: IntoIterator<Item = f32>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0_f64, 0_u64), |(s, n), v| (s + f64::from(v), n + 1));
    if count == 0 {
        f32::NAN
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        {
            (sum / count as f64) as f32
        }
    }
}
