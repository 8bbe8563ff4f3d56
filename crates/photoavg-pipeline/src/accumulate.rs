//! Running composite of a group of prepared frames.
//!
//! The composite keeps an exact per-channel **sum** of every folded
//! frame plus the number of frames it represents. Inputs are 8-bit, so
//! the `f32` sum stays exact up to 2^24 (roughly 65 000 frames of pure
//! white), and the mean is taken once after the last fold:
//!
//! ```text
//! mean = Σ pixel_i / N
//! ```
//!
//! Because the sum is exact, a composite restored from the cache and
//! [`absorb`](Composite::absorb)ed into a fresh one gives bit-identical
//! results to folding every original frame again.

use image::Rgb;

use crate::transform::{self, WHITE};
use crate::types::{CombinationMode, Dimensions, PipelineError, Rgb32FImage, RgbImage};

/// Accumulated sum of prepared frames at one square dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    sum: Rgb32FImage,
    count: u32,
}

impl Composite {
    /// An empty composite of `dimension × dimension`.
    #[must_use]
    pub fn new(dimension: u32) -> Self {
        Self {
            sum: Rgb32FImage::new(dimension, dimension),
            count: 0,
        }
    }

    /// Rebuild a composite from a stored sum.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if `sum` is not square.
    pub fn from_sum(sum: Rgb32FImage, count: u32) -> Result<Self, PipelineError> {
        let (width, height) = sum.dimensions();
        if width != height {
            return Err(PipelineError::DimensionMismatch {
                expected: Dimensions::square(width.max(height)),
                actual: Dimensions::new(width, height),
            });
        }
        Ok(Self { sum, count })
    }

    /// Side length of the square composite.
    #[must_use]
    pub fn dimension(&self) -> u32 {
        self.sum.width()
    }

    /// Number of frames folded in so far.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// The raw per-channel sum.
    #[must_use]
    pub const fn sum(&self) -> &Rgb32FImage {
        &self.sum
    }

    /// Consume the composite, returning the raw sum and the frame count.
    #[must_use]
    pub fn into_parts(self) -> (Rgb32FImage, u32) {
        (self.sum, self.count)
    }

    fn check_shape(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        if self.sum.dimensions() == (width, height) {
            Ok(())
        } else {
            Err(PipelineError::DimensionMismatch {
                expected: Dimensions::square(self.dimension()),
                actual: Dimensions::new(width, height),
            })
        }
    }

    /// Add one prepared frame.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the frame is not
    /// the composite's shape.
    pub fn fold(&mut self, frame: &RgbImage) -> Result<(), PipelineError> {
        self.check_shape(frame.width(), frame.height())?;
        for (acc, &value) in self.sum.iter_mut().zip(frame.iter()) {
            *acc += f32::from(value);
        }
        self.count += 1;
        Ok(())
    }

    /// Add a previously accumulated composite, e.g. one restored from
    /// the cache. Its sum is added directly and its count carried over.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if `other` has a
    /// different dimension.
    pub fn absorb(&mut self, other: &Self) -> Result<(), PipelineError> {
        self.check_shape(other.sum.width(), other.sum.height())?;
        for (acc, &value) in self.sum.iter_mut().zip(other.sum.iter()) {
            *acc += value;
        }
        self.count += other.count;
        Ok(())
    }

    /// Re-harmonize the composite to a new target dimension.
    ///
    /// All frames were even-sized and centered, so a centered crop (in
    /// [`CombinationMode::Crop`]) or a centered pad with `255 · count`
    /// fill (in [`CombinationMode::Pad`]) lands every original pixel
    /// exactly where preparing the frames at the new size would have.
    /// Resampling does not commute with summation, so
    /// [`CombinationMode::Resize`] only accepts the current dimension.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IncompatiblePartial`] if the reshape
    /// cannot be done exactly.
    pub fn reshape(&self, mode: CombinationMode, dimension: u32) -> Result<Self, PipelineError> {
        let from = self.dimension();
        if from == dimension {
            return Ok(self.clone());
        }

        let incompatible = |_| PipelineError::IncompatiblePartial {
            mode,
            from,
            to: dimension,
        };
        let sum = match mode {
            CombinationMode::Crop => {
                transform::crop_center(&self.sum, dimension).map_err(incompatible)?
            }
            CombinationMode::Pad => {
                #[allow(clippy::cast_precision_loss)]
                let fill = f32::from(WHITE.0[0]) * self.count as f32;
                transform::pad_center(&self.sum, dimension, Rgb([fill; 3]))
                    .map_err(incompatible)?
            }
            CombinationMode::Resize => {
                return Err(PipelineError::IncompatiblePartial {
                    mode,
                    from,
                    to: dimension,
                });
            }
        };

        Ok(Self {
            sum,
            count: self.count,
        })
    }

    /// Per-pixel mean over every folded frame.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyGroup`] if nothing was folded.
    pub fn mean(&self) -> Result<Rgb32FImage, PipelineError> {
        if self.count == 0 {
            return Err(PipelineError::EmptyGroup);
        }

        #[allow(clippy::cast_precision_loss)]
        let count = self.count as f32;
        let mut mean = self.sum.clone();
        for value in mean.iter_mut() {
            *value /= count;
        }
        Ok(mean)
    }
}
