//! Shared types for the photoavg averaging pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` so downstream crates can reference prepared
/// frames and finished composites without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `Rgb32FImage`, the storage type of accumulated sums.
pub use image::Rgb32FImage;

/// Geometric harmonization policy applied to every image of a group.
///
/// The same mode drives both the [`resolve`](crate::dimension::resolve)
/// policy (smallest vs. largest extent) and the per-image
/// [`prepare`](crate::transform::prepare) behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationMode {
    /// Center-crop every image to the smallest extent in the group.
    #[default]
    Crop,
    /// Center every image on a white canvas sized to the largest extent.
    Pad,
    /// Scale the minor axis to the largest extent, then center-crop.
    Resize,
}

impl CombinationMode {
    /// All modes, in declaration order.
    pub const ALL: [Self; 3] = [Self::Crop, Self::Pad, Self::Resize];

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Pad => "pad",
            Self::Resize => "resize",
        }
    }
}

impl fmt::Display for CombinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombinationMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::InvalidMode(s.to_owned()))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new set of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a `side × side` square.
    #[must_use]
    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// The shorter of the two axes.
    #[must_use]
    pub fn minor(self) -> u32 {
        self.width.min(self.height)
    }

    /// The longer of the two axes.
    #[must_use]
    pub fn major(self) -> u32 {
        self.width.max(self.height)
    }

    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors that can occur while averaging a group.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode an input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A group with no members was passed to the pipeline.
    #[error("group has no images")]
    EmptyGroup,

    /// Unrecognized combination mode name.
    #[error("invalid combination mode '{0}' (expected crop, pad, or resize)")]
    InvalidMode(String),

    /// Unrecognized grouping granularity name.
    #[error("invalid granularity '{0}' (expected day, month, or year)")]
    InvalidGranularity(String),

    /// A crop target larger than one of the image axes.
    #[error("cannot crop {width}x{height} image to {dimension}x{dimension}")]
    DimensionUnderflow {
        /// Requested square side.
        dimension: u32,
        /// Image width after evenness normalization.
        width: u32,
        /// Image height after evenness normalization.
        height: u32,
    },

    /// A pad target smaller than one of the image axes.
    #[error("cannot pad {width}x{height} image to {dimension}x{dimension}")]
    DimensionOverflow {
        /// Requested square side.
        dimension: u32,
        /// Image width after evenness normalization.
        width: u32,
        /// Image height after evenness normalization.
        height: u32,
    },

    /// A frame whose shape differs from the composite it is folded into.
    #[error("frame is {actual}, composite expects {expected}")]
    DimensionMismatch {
        /// Composite shape.
        expected: Dimensions,
        /// Offending frame shape.
        actual: Dimensions,
    },

    /// A cached partial composite that cannot be reshaped exactly.
    #[error("cached composite at {from}x{from} cannot be reshaped to {to}x{to} in {mode} mode")]
    IncompatiblePartial {
        /// Mode of the current run.
        mode: CombinationMode,
        /// Side of the cached composite.
        from: u32,
        /// Target side of the current run.
        to: u32,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("crop".parse::<CombinationMode>().unwrap(), CombinationMode::Crop);
        assert_eq!("PAD".parse::<CombinationMode>().unwrap(), CombinationMode::Pad);
        assert_eq!(" Resize ".parse::<CombinationMode>().unwrap(), CombinationMode::Resize);
    }

    #[test]
    fn unknown_mode_is_invalid() {
        let result = "stretch".parse::<CombinationMode>();
        assert!(matches!(result, Err(PipelineError::InvalidMode(ref s)) if s == "stretch"));
    }

    #[test]
    fn mode_display_round_trips_through_from_str() {
        for mode in CombinationMode::ALL {
            assert_eq!(mode.to_string().parse::<CombinationMode>().unwrap(), mode);
        }
    }

    #[test]
    fn mode_serializes_lowercase() {
        let json = serde_json::to_string(&CombinationMode::Resize).unwrap();
        assert_eq!(json, "\"resize\"");
    }

    #[test]
    fn dimensions_axes() {
        let d = Dimensions::new(130, 110);
        assert_eq!(d.minor(), 110);
        assert_eq!(d.major(), 130);
        assert_eq!(d.pixel_count(), 14_300);
        assert_eq!(d.to_string(), "130x110");
    }

    #[test]
    fn error_messages_name_the_geometry() {
        let err = PipelineError::DimensionUnderflow {
            dimension: 200,
            width: 130,
            height: 110,
        };
        assert_eq!(err.to_string(), "cannot crop 130x110 image to 200x200");
    }
}
