use image::{GrayImage, Luma, RgbaImage};

use crate::roi::fingerprint::to_luma;

/// Converts image to binary by keeping only bright pixels.
///
/// Pixels where R > threshold AND G > threshold AND B > threshold become black (text).
/// All other pixels become white (background).
///
/// Table text (pot, stacks, names) is rendered bright on a dark felt, so this
/// isolates it from chips and card art.
pub fn threshold_bright_pixels(img: &RgbaImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let r = pixel[0];
        let g = pixel[1];
        let b = pixel[2];

        let value = if r > threshold && g > threshold && b > threshold {
            0u8
        } else {
            255u8
        };

        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Plain grayscale conversion for engines that binarize internally.
pub fn to_grayscale(img: &RgbaImage) -> GrayImage {
    to_luma(img)
}
