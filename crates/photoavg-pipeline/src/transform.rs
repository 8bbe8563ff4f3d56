//! Per-image geometric harmonization.
//!
//! Every source image goes through the same two steps before it can
//! be folded into a composite:
//!
//! 1. **Evenness normalization**: an odd width loses its leftmost
//!    column, an odd height loses its topmost row.
//! 2. **Reshape** to a `dimension × dimension` square according to the
//!    [`CombinationMode`]: centered crop, centered pad on a white
//!    canvas, or aspect-preserving resize followed by a centered crop.
//!
//! The crop and pad helpers are generic over the pixel type so the
//! same geometry can be applied to 8-bit frames and to accumulated
//! `f32` sums.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel, Rgb, RgbImage};

use crate::types::{CombinationMode, Dimensions, PipelineError};

/// An owned image buffer of any pixel type.
pub type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Fill color for padded regions.
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Filter used when the resize step shrinks the major axis.
const DOWNSCALE_FILTER: FilterType = FilterType::Lanczos3;

/// Filter used when the resize step grows the major axis.
const UPSCALE_FILTER: FilterType = FilterType::Nearest;

/// Decode raw image bytes into an 8-bit RGB frame.
///
/// Grayscale sources are broadcast to three identical channels and any
/// alpha channel is dropped, so every frame of a group has the same
/// channel layout.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// Drop the leftmost column of an odd-width image and the topmost row
/// of an odd-height image.
#[must_use]
pub fn even_dimensions<P>(image: &Buffer<P>) -> Buffer<P>
where
    P: Pixel + 'static,
{
    let x = image.width() % 2;
    let y = image.height() % 2;
    if x == 0 && y == 0 {
        return image.clone();
    }

    imageops::crop_imm(image, x, y, image.width() - x, image.height() - y).to_image()
}

/// Slice the centered `dimension × dimension` region out of `image`.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionUnderflow`] if `dimension` exceeds
/// either axis.
pub fn crop_center<P>(image: &Buffer<P>, dimension: u32) -> Result<Buffer<P>, PipelineError>
where
    P: Pixel + 'static,
{
    let (width, height) = image.dimensions();
    if dimension > width || dimension > height {
        return Err(PipelineError::DimensionUnderflow {
            dimension,
            width,
            height,
        });
    }
    if width == dimension && height == dimension {
        return Ok(image.clone());
    }

    let x = (width - dimension) / 2;
    let y = (height - dimension) / 2;
    Ok(imageops::crop_imm(image, x, y, dimension, dimension).to_image())
}

/// Embed `image` at the center of a `dimension × dimension` canvas
/// filled with `fill`.
///
/// Offsets use floor division, so an odd leftover puts the extra
/// fill column/row on the right/bottom edge.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionOverflow`] if either axis exceeds
/// `dimension`.
pub fn pad_center<P>(image: &Buffer<P>, dimension: u32, fill: P) -> Result<Buffer<P>, PipelineError>
where
    P: Pixel + 'static,
{
    let (width, height) = image.dimensions();
    if width > dimension || height > dimension {
        return Err(PipelineError::DimensionOverflow {
            dimension,
            width,
            height,
        });
    }

    let mut canvas = ImageBuffer::from_pixel(dimension, dimension, fill);
    let x = (dimension - width) / 2;
    let y = (dimension - height) / 2;
    imageops::replace(&mut canvas, image, i64::from(x), i64::from(y));
    Ok(canvas)
}

/// Scale the minor axis of `image` to exactly `dimension`, scale the
/// major axis by the same ratio, then center-crop to a square.
///
/// Shrinking uses an anti-aliasing filter; growing uses nearest
/// neighbor. The resized image is normalized to even dimensions again
/// before cropping, since the scaled major axis may come out odd.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionUnderflow`] if the image has a
/// zero-length axis.
pub fn resize_cover(image: &RgbImage, dimension: u32) -> Result<RgbImage, PipelineError> {
    let (width, height) = image.dimensions();
    let source = Dimensions::new(width, height);
    let (minor, major) = (source.minor(), source.major());
    if minor == 0 {
        return Err(PipelineError::DimensionUnderflow {
            dimension,
            width,
            height,
        });
    }

    let scaled_major = scale_axis(major, minor, dimension);
    let (new_width, new_height) = if width <= height {
        (dimension, scaled_major)
    } else {
        (scaled_major, dimension)
    };

    let resized = if (new_width, new_height) == (width, height) {
        image.clone()
    } else {
        let filter = if scaled_major < major {
            DOWNSCALE_FILTER
        } else {
            UPSCALE_FILTER
        };
        imageops::resize(image, new_width, new_height, filter)
    };

    crop_center(&even_dimensions(&resized), dimension)
}

/// `round(major * dimension / minor)`, with halves rounding up.
fn scale_axis(major: u32, minor: u32, dimension: u32) -> u32 {
    let numerator = 2 * u64::from(major) * u64::from(dimension) + u64::from(minor);
    let scaled = numerator / (2 * u64::from(minor));
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// Normalize parity, then reshape `image` to `dimension × dimension`
/// according to `mode`.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionUnderflow`] when cropping to a
/// side larger than the image, and [`PipelineError::DimensionOverflow`]
/// when padding to a side smaller than the image.
pub fn prepare(
    image: &RgbImage,
    mode: CombinationMode,
    dimension: u32,
) -> Result<RgbImage, PipelineError> {
    let even = even_dimensions(image);
    match mode {
        CombinationMode::Crop => crop_center(&even, dimension),
        CombinationMode::Pad => pad_center(&even, dimension, WHITE),
        CombinationMode::Resize => resize_cover(&even, dimension),
    }
}

/// Decode raw image bytes and [`prepare`] the result.
///
/// # Errors
///
/// Any error from [`decode`] or [`prepare`].
pub fn prepare_encoded(
    bytes: &[u8],
    mode: CombinationMode,
    dimension: u32,
) -> Result<RgbImage, PipelineError> {
    let image = decode(bytes)?;
    prepare(&image, mode, dimension)
}
