//! Common output dimension for a group of images.
//!
//! Every composite is square. Its side is derived once per group from
//! the dimensions of all members:
//!
//! - [`CombinationMode::Crop`]: the smallest extent in either axis, so
//!   no image has to grow.
//! - [`CombinationMode::Pad`] and [`CombinationMode::Resize`]: the
//!   largest extent in either axis, so no image is clipped before
//!   resizing.
//!
//! The side is always rounded down to an even number so padding and
//! cropping split evenly on both edges.

use crate::types::{CombinationMode, Dimensions, PipelineError};

/// Compute the square target side for a group.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyGroup`] if `dimensions` is empty.
pub fn resolve(mode: CombinationMode, dimensions: &[Dimensions]) -> Result<u32, PipelineError> {
    let side = match mode {
        CombinationMode::Crop => dimensions.iter().map(|d| d.minor()).min(),
        CombinationMode::Pad | CombinationMode::Resize => {
            dimensions.iter().map(|d| d.major()).max()
        }
    }
    .ok_or(PipelineError::EmptyGroup)?;

    Ok(round_down_to_even(side))
}

/// Largest even number not greater than `value`.
#[must_use]
pub const fn round_down_to_even(value: u32) -> u32 {
    value & !1
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dims(pairs: &[(u32, u32)]) -> Vec<Dimensions> {
        pairs.iter().map(|&(w, h)| Dimensions::new(w, h)).collect()
    }

    #[test]
    fn crop_uses_smallest_extent() {
        let group = dims(&[(200, 150), (140, 180), (160, 137)]);
        assert_eq!(resolve(CombinationMode::Crop, &group).unwrap(), 136);
    }

    #[test]
    fn pad_uses_largest_extent() {
        let group = dims(&[(200, 150), (140, 180), (131, 111)]);
        assert_eq!(resolve(CombinationMode::Pad, &group).unwrap(), 200);
    }

    #[test]
    fn resize_matches_pad_policy() {
        let group = dims(&[(201, 150), (140, 180)]);
        assert_eq!(resolve(CombinationMode::Resize, &group).unwrap(), 200);
        assert_eq!(
            resolve(CombinationMode::Resize, &group).unwrap(),
            resolve(CombinationMode::Pad, &group).unwrap(),
        );
    }

    #[test]
    fn odd_results_round_down() {
        let group = dims(&[(133, 140), (150, 139)]);
        assert_eq!(resolve(CombinationMode::Crop, &group).unwrap(), 132);
        let group = dims(&[(133, 199)]);
        assert_eq!(resolve(CombinationMode::Pad, &group).unwrap(), 198);
    }

    #[test]
    fn empty_group_is_an_error() {
        for mode in CombinationMode::ALL {
            assert!(matches!(
                resolve(mode, &[]),
                Err(PipelineError::EmptyGroup)
            ));
        }
    }

    #[test]
    fn round_down_to_even_values() {
        assert_eq!(round_down_to_even(0), 0);
        assert_eq!(round_down_to_even(1), 0);
        assert_eq!(round_down_to_even(2), 2);
        assert_eq!(round_down_to_even(131), 130);
    }
}
