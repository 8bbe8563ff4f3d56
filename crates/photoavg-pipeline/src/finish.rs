//! Contrast stretching of a finished mean composite.
//!
//! Averaging many photographs compresses the tonal range towards the
//! middle. The finisher stretches it back out:
//!
//! 1. Mask every sample that is not exactly `255.0`. Exact white is
//!    padding (or saturated everywhere) and is excluded from the
//!    statistics and left untouched.
//! 2. Take the 0.5th and 99.5th percentiles of the masked samples.
//! 3. Clip masked samples to that range and remap it linearly onto
//!    `[0, 255]`.
//! 4. Truncate to 8 bits.
//!
//! When the mask is empty, or both percentiles coincide, step 3 is
//! skipped and the mean is only converted to 8 bits.

use serde::{Deserialize, Serialize};

use crate::types::{Rgb32FImage, RgbImage};

/// Lower percentile of the stretch range.
pub const LOWER_PERCENTILE: f64 = 0.5;

/// Upper percentile of the stretch range.
pub const UPPER_PERCENTILE: f64 = 99.5;

/// Sample value excluded from the stretch statistics.
pub const BACKGROUND: f32 = 255.0;

/// The input range that was mapped onto `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StretchBounds {
    /// Value at [`LOWER_PERCENTILE`].
    pub lower: f64,
    /// Value at [`UPPER_PERCENTILE`].
    pub upper: f64,
}

/// A displayable composite plus what the stretch did to it.
#[derive(Debug, Clone)]
pub struct Finished {
    /// 8-bit output image.
    pub image: RgbImage,
    /// Stretch range, or `None` when rescaling was skipped.
    pub bounds: Option<StretchBounds>,
    /// Number of samples that took part in the stretch.
    pub masked_samples: u64,
}

/// Contrast-stretch a mean composite and convert it to 8 bits.
#[must_use]
pub fn finish(mean: &Rgb32FImage) -> Finished {
    let mut masked: Vec<f32> = mean
        .iter()
        .copied()
        .filter(|&v| v != BACKGROUND)
        .collect();
    masked.sort_by(f32::total_cmp);
    let masked_samples = masked.len() as u64;

    let bounds = match (
        percentile(&masked, LOWER_PERCENTILE),
        percentile(&masked, UPPER_PERCENTILE),
    ) {
        (Some(lower), Some(upper)) if upper > lower => Some(StretchBounds { lower, upper }),
        _ => None,
    };

    let raw = mean
        .iter()
        .map(|&v| match bounds {
            Some(b) if v != BACKGROUND => to_u8(stretch(f64::from(v), b)),
            _ => to_u8(f64::from(v)),
        })
        .collect();

    let image = RgbImage::from_raw(mean.width(), mean.height(), raw)
        .unwrap_or_else(|| RgbImage::new(mean.width(), mean.height()));

    Finished {
        image,
        bounds,
        masked_samples,
    }
}

/// Linear-interpolated percentile of sorted samples.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn percentile(sorted: &[f32], pct: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;

    #[allow(clippy::cast_precision_loss)]
    let rank = (pct / 100.0).clamp(0.0, 1.0) * last as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let below = rank.floor() as usize;
    let above = (below + 1).min(last);
    #[allow(clippy::cast_precision_loss)]
    let fraction = rank - below as f64;

    let low = f64::from(sorted[below]);
    let high = f64::from(sorted[above]);
    Some((high - low).mul_add(fraction, low))
}

/// Clip `value` to the bounds and map them onto `[0, 255]`.
fn stretch(value: f64, bounds: StretchBounds) -> f64 {
    let clipped = value.clamp(bounds.lower, bounds.upper);
    (clipped - bounds.lower) / (bounds.upper - bounds.lower) * 255.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(value: f64) -> u8 {
    value.clamp(0.0, 255.0) as u8
}
