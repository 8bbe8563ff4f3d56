//! photoavg-pipeline: Pure averaging pipeline (sans-IO).
//!
//! Turns a group of photographs into one square "average" composite
//! through:
//! dimension resolution -> per-image harmonization -> accumulation ->
//! mean -> percentile contrast stretch.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and cached sums and returns structured data. Reading
//! files, the composite cache, metadata, and publishing all live in
//! `photoavg-io`.

pub mod accumulate;
pub mod describe;
pub mod diagnostics;
pub mod dimension;
pub mod finish;
pub mod group;
pub mod naming;
pub mod transform;
pub mod types;

pub use accumulate::Composite;
pub use describe::{Credits, Description, describe};
pub use diagnostics::{AverageDiagnostics, Clock, SystemClock};
pub use finish::{Finished, StretchBounds};
pub use group::{Granularity, Groups, SourceImage, group};
pub use types::{CombinationMode, Dimensions, PipelineError, Rgb32FImage, RgbImage};

use diagnostics::{AverageSummary, StageDiagnostics, StageMetrics};

/// One input to [`average`].
#[derive(Debug, Clone)]
pub enum Contribution {
    /// Raw bytes of an encoded source image.
    Encoded(Vec<u8>),
    /// A previously accumulated composite, typically from the cache.
    Partial(Composite),
}

/// Result of averaging one group.
#[derive(Debug, Clone)]
pub struct Averaged {
    /// The finished 8-bit composite.
    pub image: RgbImage,
    /// The raw accumulated sum, suitable for caching.
    pub composite: Composite,
    /// Per-stage timing and counts.
    pub diagnostics: AverageDiagnostics,
}

/// Average a stream of contributions into one finished composite.
///
/// Contributions are consumed one at a time, so at most one decoded
/// frame is held in memory alongside the running sum. Partial
/// composites are reshaped to `dimension` before they are absorbed.
///
/// # Pipeline steps
///
/// 1. Decode each encoded image, normalize it to even dimensions, and
///    reshape it to `dimension × dimension` according to `mode`
/// 2. Fold the frame (or absorb the partial composite) into the sum
/// 3. Divide by the total image count
/// 4. Contrast-stretch the non-white samples and truncate to 8 bits
///
/// The contribution iterator may fail with the caller's own error type
/// (e.g. a file read error); pipeline errors are converted into it.
///
/// # Errors
///
/// Propagates the first error yielded by `contributions`.
/// Returns [`PipelineError::ImageDecode`] for an undecodable image.
/// Returns [`PipelineError::DimensionUnderflow`] or
/// [`PipelineError::DimensionOverflow`] for an image that does not fit
/// `dimension` in `mode`.
/// Returns [`PipelineError::IncompatiblePartial`] for a partial
/// composite that cannot be reshaped exactly.
/// Returns [`PipelineError::EmptyGroup`] if nothing was contributed.
pub fn average<I, E, C>(
    mode: CombinationMode,
    dimension: u32,
    contributions: I,
    clock: &C,
) -> Result<Averaged, E>
where
    I: IntoIterator<Item = Result<Contribution, E>>,
    E: From<PipelineError>,
    C: Clock,
{
    let start = clock.now();

    // 1-2. Prepare and fold.
    let mut composite = Composite::new(dimension);
    let mut frames_decoded = 0;
    let mut cached_images = 0;
    for contribution in contributions {
        match contribution? {
            Contribution::Encoded(bytes) => {
                let frame = transform::prepare_encoded(&bytes, mode, dimension)?;
                composite.fold(&frame)?;
                frames_decoded += 1;
            }
            Contribution::Partial(partial) => {
                let partial = partial.reshape(mode, dimension)?;
                composite.absorb(&partial)?;
                cached_images += partial.count();
            }
        }
    }
    let fold = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Fold {
            frames_decoded,
            cached_images,
        },
    };

    // 3-4. Mean and stretch.
    let finish_start = clock.now();
    let mean = composite.mean()?;
    let finished = finish::finish(&mean);
    let finish = StageDiagnostics {
        duration: clock.elapsed(&finish_start),
        metrics: StageMetrics::Finish {
            bounds: finished.bounds,
            masked_samples: finished.masked_samples,
            total_samples: Dimensions::square(dimension).pixel_count() * 3,
        },
    };

    let diagnostics = AverageDiagnostics {
        fold,
        finish,
        total_duration: clock.elapsed(&start),
        summary: AverageSummary {
            dimension,
            image_count: composite.count(),
        },
    };

    Ok(Averaged {
        image: finished.image,
        composite,
        diagnostics,
    })
}
