//! Frame conditioning before detection.
//!
//! Detectors run on grayscale, histogram-equalized input: equalization
//! flattens lighting differences (lamps off, backlit faces) that would
//! otherwise starve the classifiers of contrast.

use image::GrayImage;
use imageproc::contrast::equalize_histogram;

use super::Frame;

/// Convert a captured frame into detector-ready form.
pub fn detector_input(frame: &Frame) -> GrayImage {
    equalize_histogram(&to_luma(frame))
}

/// Standard ITU-R 601 luma conversion.
fn to_luma(frame: &Frame) -> GrayImage {
    let mut gray = vec![0u8; (frame.width * frame.height) as usize];
    for (pixel, out) in frame.pixels.chunks_exact(3).zip(gray.iter_mut()) {
        let luma =
            0.299 * f32::from(pixel[0]) + 0.587 * f32::from(pixel[1]) + 0.114 * f32::from(pixel[2]);
        *out = luma.round().clamp(0.0, 255.0) as u8;
    }
    GrayImage::from_raw(frame.width, frame.height, gray)
        .expect("luma buffer length matches frame dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_uses_standard_weights() {
        let red = Frame::solid(2, 2, 255, 0, 0);
        assert_eq!(to_luma(&red).get_pixel(0, 0).0[0], 76);

        let white = Frame::solid(2, 2, 255, 255, 255);
        assert_eq!(to_luma(&white).get_pixel(0, 0).0[0], 255);

        let black = Frame::solid(2, 2, 0, 0, 0);
        assert_eq!(to_luma(&black).get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn detector_input_preserves_dimensions() {
        let frame = Frame::solid(8, 6, 40, 80, 120);
        let input = detector_input(&frame);
        assert_eq!(input.dimensions(), (8, 6));
    }

    #[test]
    fn equalization_preserves_brightness_ordering() {
        // Two-tone frame: a dark half and a bright half must stay ordered
        // after equalization.
        let mut pixels = Vec::new();
        for i in 0..16 {
            let v = if i < 8 { 30u8 } else { 200u8 };
            pixels.extend_from_slice(&[v, v, v]);
        }
        let frame = Frame::new(4, 4, pixels);
        let input = detector_input(&frame);
        let dark = input.get_pixel(0, 0).0[0];
        let bright = input.get_pixel(3, 3).0[0];
        assert!(dark < bright);
    }
}
