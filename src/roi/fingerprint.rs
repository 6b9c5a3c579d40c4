use image::{ImageBuffer, Luma, Rgba, RgbaImage};

use crate::config::RelativeRect;

/// Side length of the reduced grid. 8x8 gives a 64-bit fingerprint.
pub const GRID_SIZE: u32 = 8;

const FINGERPRINT_BITS: u32 = GRID_SIZE * GRID_SIZE;

/// Average-hash of a region: one bit per grid cell, set when the cell is
/// brighter than the mean of all cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Number of differing bits.
    pub fn hamming(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Hamming distance scaled to 0.0-1.0.
    pub fn distance(&self, other: &Fingerprint) -> f32 {
        self.hamming(other) as f32 / FINGERPRINT_BITS as f32
    }
}

/// Crops a sub-region from a frame using relative coordinates.
///
/// Converts the relative rect (0.0–1.0) to absolute pixel coordinates and
/// clamps to frame bounds. Returns `None` when the clamped area is empty.
pub fn crop_region(img: &RgbaImage, region: &RelativeRect) -> Option<RgbaImage> {
    let (w, h) = img.dimensions();
    let (x0, y0, rw, rh) = region.to_absolute(w, h);
    if rw == 0 || rh == 0 {
        return None;
    }

    Some(image::imageops::crop_imm(img, x0, y0, rw, rh).to_image())
}

/// Converts an RGBA image to 8-bit luminance.
///
/// Uses the ITU-R BT.601 luma formula: Y = 0.299*R + 0.587*G + 0.114*B
pub fn to_luma(img: &RgbaImage) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        output.put_pixel(x, y, Luma([luma(pixel)]));
    }

    output
}

fn luma(pixel: &Rgba<u8>) -> u8 {
    let r = pixel[0] as f32;
    let g = pixel[1] as f32;
    let b = pixel[2] as f32;
    (0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8
}

/// Reduces a grayscale image to a `GRID_SIZE` x `GRID_SIZE` grid by area
/// averaging. Each cell covers `[i*w/8, (i+1)*w/8)` so a uniform input
/// produces an exactly uniform grid.
///
/// Images narrower or shorter than the grid reuse edge pixels.
fn reduce(gray: &ImageBuffer<Luma<u8>, Vec<u8>>) -> [u32; FINGERPRINT_BITS as usize] {
    let (w, h) = gray.dimensions();
    let mut cells = [0u32; FINGERPRINT_BITS as usize];

    for gy in 0..GRID_SIZE {
        let y_start = gy * h / GRID_SIZE;
        let y_end = ((gy + 1) * h / GRID_SIZE).max(y_start + 1).min(h);
        for gx in 0..GRID_SIZE {
            let x_start = gx * w / GRID_SIZE;
            let x_end = ((gx + 1) * w / GRID_SIZE).max(x_start + 1).min(w);

            let mut sum: u64 = 0;
            let mut count: u64 = 0;
            for y in y_start.min(h - 1)..y_end {
                for x in x_start.min(w - 1)..x_end {
                    sum += gray.get_pixel(x, y)[0] as u64;
                    count += 1;
                }
            }

            cells[(gy * GRID_SIZE + gx) as usize] = if count > 0 {
                (sum / count) as u32
            } else {
                0
            };
        }
    }

    cells
}

/// Computes the fingerprint of an RGBA crop.
///
/// Returns `None` for an empty image.
pub fn fingerprint(img: &RgbaImage) -> Option<Fingerprint> {
    if img.width() == 0 || img.height() == 0 {
        return None;
    }

    let gray = to_luma(img);
    let cells = reduce(&gray);

    // Compare scaled by cell count to stay in integers.
    let total: u32 = cells.iter().sum();
    let mut bits: u64 = 0;
    for (i, &cell) in cells.iter().enumerate() {
        if cell * FINGERPRINT_BITS > total {
            bits |= 1 << i;
        }
    }

    Some(Fingerprint(bits))
}
