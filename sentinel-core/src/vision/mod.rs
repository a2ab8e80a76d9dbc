//! Panic-vision monitoring.
//!
//! ## Architecture
//!
//! ```text
//! Camera → FrameSource → crossbeam channel → session loop (spawn_blocking)
//!                                                  │
//!                                          preprocess (gray + equalize)
//!                                                  │
//!                                          FrameAnalyzer (face → eye)
//!                                                  │
//!                                       VisionEvent → coordinator
//! ```
//!
//! The camera produces frames on its own cadence; the session loop consumes
//! them one at a time and never blocks the coordinator. All device and
//! detector resources are owned by the session and released on every exit
//! path.

pub mod analyzer;
pub mod artifact;
pub mod preprocess;
pub mod session;
pub mod stub;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use image::GrayImage;
use parking_lot::Mutex;

use crate::error::Result;

/// One captured camera frame: tightly packed RGB8.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major RGB.
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A uniform frame, handy for scripted sources.
    pub fn solid(width: u32, height: u32, r: u8, g: u8, b: u8) -> Self {
        let pixels = [r, g, b].repeat(width as usize * height as usize);
        Self::new(width, height, pixels)
    }
}

/// An axis-aligned detection region in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Crop this region out of `image`, clamped to the image bounds.
    pub fn crop(&self, image: &GrayImage) -> GrayImage {
        let x = self.x.min(image.width().saturating_sub(1));
        let y = self.y.min(image.height().saturating_sub(1));
        let width = self.width.min(image.width() - x).max(1);
        let height = self.height.min(image.height() - y).max(1);
        image::imageops::crop_imm(image, x, y, width, height).to_image()
    }
}

/// Camera seam.
///
/// `open()` requests device access and returns the frame feed; a denied
/// permission or missing camera is a `SentinelError::Device`. `close()` is
/// idempotent and safe to call whether or not `open()` succeeded.
pub trait FrameSource: Send + 'static {
    fn open(&mut self) -> Result<Receiver<Frame>>;
    fn close(&mut self);
}

/// Thread-safe reference-counted handle to any `FrameSource` implementor.
#[derive(Clone)]
pub struct CameraHandle(pub Arc<Mutex<dyn FrameSource>>);

impl CameraHandle {
    pub fn new<S: FrameSource>(source: S) -> Self {
        Self(Arc::new(Mutex::new(source)))
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle").finish_non_exhaustive()
    }
}

/// Contract for face/eye classifiers.
///
/// `&mut self` because detectors may keep scratch buffers or cascade state
/// between frames.
pub trait Detector: Send + 'static {
    /// Detect regions in a preprocessed (grayscale, equalized) image.
    fn detect(&mut self, input: &GrayImage) -> Result<Vec<Region>>;
}

/// The face + eye detectors of one vision session.
pub struct DetectorPair {
    pub face: Box<dyn Detector>,
    pub eye: Box<dyn Detector>,
}

/// Builds a fresh `DetectorPair` per session.
///
/// Loading may block (artifact download, model parse); the session loop
/// calls it from its own blocking thread. Failure is a
/// `SentinelError::ResourceLoad` and aborts the session the same way a
/// device error does.
pub trait DetectorBackend: Send + 'static {
    fn load(&mut self) -> Result<DetectorPair>;
}

/// Thread-safe reference-counted handle to any `DetectorBackend`.
#[derive(Clone)]
pub struct DetectorBackendHandle(pub Arc<Mutex<dyn DetectorBackend>>);

impl DetectorBackendHandle {
    pub fn new<B: DetectorBackend>(backend: B) -> Self {
        Self(Arc::new(Mutex::new(backend)))
    }
}

impl std::fmt::Debug for DetectorBackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorBackendHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_frame_has_expected_len() {
        let frame = Frame::solid(4, 3, 10, 20, 30);
        assert_eq!(frame.pixels.len(), 4 * 3 * 3);
        assert_eq!(&frame.pixels[..3], &[10, 20, 30]);
    }

    #[test]
    fn crop_clamps_to_image_bounds() {
        let image = GrayImage::from_pixel(10, 10, image::Luma([7u8]));
        let region = Region::new(8, 8, 6, 6);
        let crop = region.crop(&image);
        assert_eq!(crop.dimensions(), (2, 2));
    }

    #[test]
    fn crop_inside_bounds_keeps_requested_size() {
        let image = GrayImage::from_pixel(20, 20, image::Luma([0u8]));
        let crop = Region::new(2, 3, 5, 4).crop(&image);
        assert_eq!(crop.dimensions(), (5, 4));
    }
}
