//! Pixel marshaling shared by both scorers: resizing, square padding, and
//! conversion to normalized NCHW tensors.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{Array, Array3, Array4, Dim, Dimension};

/// CLIP normalization constants
pub const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
pub const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Symmetric normalization to [-1, 1]
pub const HALF_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const HALF_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Output size for an aspect-preserving resize that sets the shorter edge to
/// `shorter`, caps the longer edge at `shorter * 1333 / 800`, and floors both
/// edges to a multiple of `divisor`. Returns `(width, height)`.
pub fn shorter_edge_size(width: u32, height: u32, shorter: u32, divisor: u32) -> (u32, u32) {
    let longer = (1333.0 / 800.0 * shorter as f64) as u32;
    let (w, h) = (width as f64, height as f64);
    let short = w.min(h);

    let scale = shorter as f64 / short;
    let (mut new_w, mut new_h) = if h < w {
        (scale * w, shorter as f64)
    } else {
        (shorter as f64, scale * h)
    };

    let long = new_w.max(new_h);
    if long > longer as f64 {
        let scale = longer as f64 / long;
        new_w *= scale;
        new_h *= scale;
    }

    let round = |v: f64| (v + 0.5) as u32;
    let floor_to = |v: u32| ((v / divisor) * divisor).max(divisor);

    (floor_to(round(new_w)), floor_to(round(new_h)))
}

pub fn resize(rgb: &RgbImage, width: u32, height: u32) -> RgbImage {
    if rgb.dimensions() == (width, height) {
        return rgb.clone();
    }
    imageops::resize(rgb, width, height, FilterType::CatmullRom)
}

/// Pad to a square canvas filled with `fill`, keeping the content centred.
pub fn expand_to_square(rgb: &RgbImage, fill: Rgb<u8>) -> RgbImage {
    let (width, height) = rgb.dimensions();
    if width == height {
        return rgb.clone();
    }

    let side = width.max(height);
    let mut canvas = RgbImage::from_pixel(side, side, fill);
    let x = (side - width) / 2;
    let y = (side - height) / 2;
    imageops::replace(&mut canvas, rgb, x as i64, y as i64);
    canvas
}

/// Mean colour as 8-bit RGB (truncated), the padding colour for square inputs.
pub fn mean_color(mean: [f32; 3]) -> Rgb<u8> {
    Rgb(mean.map(|m| (m * 255.0) as u8))
}

/// Convert to a `[1, 3, H, W]` tensor: `(pixel / 255 - mean) / std`.
pub fn to_nchw(rgb: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, c, y, x)| {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            (pixel[c] as f32 / 255.0 - mean[c]) / std[c]
        },
    )
}

/// All-ones `[1, H, W]` mask marking every pixel as valid.
pub fn full_pixel_mask(width: u32, height: u32) -> Array3<i64> {
    Array3::ones((1, height as usize, width as usize))
}

/// Shape and row-major values, the form ONNX Runtime tensors are built from.
pub fn tensor_parts<T, const N: usize>(array: Array<T, Dim<[usize; N]>>) -> ([usize; N], Box<[T]>)
where
    Dim<[usize; N]>: Dimension,
{
    let mut shape = [0usize; N];
    shape.copy_from_slice(array.shape());
    (shape, array.into_iter().collect())
}
