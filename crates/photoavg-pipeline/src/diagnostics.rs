//! Averaging diagnostics: timing and counts for each stage of a run.
//!
//! Every call to [`average`](crate::average) collects diagnostics
//! alongside the composite. Durations are measured through the
//! [`Clock`] trait so tests and callers can substitute their own time
//! source.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::finish::StretchBounds;

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    ///
    /// # Errors
    ///
    /// Fails for negative, non-finite, or out-of-range values.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from averaging one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AverageDiagnostics {
    /// Stage 1: decode, prepare, and fold every contribution.
    pub fold: StageDiagnostics,
    /// Stage 2: mean and contrast stretch.
    pub finish: StageDiagnostics,
    /// Total wall-clock duration of both stages (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts.
    pub summary: AverageSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Fold metrics.
    Fold {
        /// Frames decoded and prepared from encoded images.
        frames_decoded: u32,
        /// Images represented by cached composites.
        cached_images: u32,
    },
    /// Finish metrics.
    Finish {
        /// Stretch range, `None` when rescaling was skipped.
        bounds: Option<StretchBounds>,
        /// Samples inside the stretch mask.
        masked_samples: u64,
        /// All samples (`dimension² × 3`).
        total_samples: u64,
    },
}

/// High-level counts for one group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AverageSummary {
    /// Side of the square composite.
    pub dimension: u32,
    /// Total images represented in the composite.
    pub image_count: u32,
}

impl AverageDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let total_ms = duration_ms(self.total_duration);
        let mut lines = vec![
            format!(
                "Composite: {0}x{0} from {1} images",
                self.summary.dimension, self.summary.image_count,
            ),
            format!("Total duration: {total_ms:.3}ms"),
            format!("{:<10} {:>12} {:>8}  {}", "Stage", "Duration", "% Total", "Details"),
            "-".repeat(72),
        ];

        for (name, diag) in [("Fold", &self.fold), ("Finish", &self.finish)] {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<10} {ms:>10.3}ms {pct:>7.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Fold {
            frames_decoded,
            cached_images,
        } => format!("{frames_decoded} decoded, {cached_images} from cache"),
        StageMetrics::Finish {
            bounds,
            masked_samples,
            total_samples,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let coverage = if *total_samples > 0 {
                *masked_samples as f64 / *total_samples as f64 * 100.0
            } else {
                0.0
            };
            match bounds {
                Some(b) => format!(
                    "stretch [{:.2}, {:.2}] over {masked_samples} samples ({coverage:.1}%)",
                    b.lower, b.upper,
                ),
                None => format!("no stretch ({masked_samples} samples in mask)"),
            }
        }
    }
}
