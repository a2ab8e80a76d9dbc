//! Scripted vision implementations for tests and the demo host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use image::GrayImage;
use tracing::debug;

use crate::error::{Result, SentinelError};

use super::{Detector, DetectorBackend, DetectorPair, Frame, FrameSource, Region};

/// Frame source that replays a script on a background thread.
pub struct ScriptedFrameSource {
    frames: Vec<Frame>,
    interval: Duration,
    /// Replay the script forever instead of ending the feed.
    repeat: bool,
    running: Arc<AtomicBool>,
}

impl ScriptedFrameSource {
    pub fn new(frames: Vec<Frame>, interval: Duration, repeat: bool) -> Self {
        Self {
            frames,
            interval,
            repeat,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Drop for ScriptedFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl FrameSource for ScriptedFrameSource {
    fn open(&mut self) -> Result<Receiver<Frame>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SentinelError::Device("camera already in use".into()));
        }

        let (tx, rx) = bounded(8);
        let frames = self.frames.clone();
        let interval = self.interval;
        let repeat = self.repeat;
        let running = Arc::clone(&self.running);

        std::thread::spawn(move || {
            debug!(frames = frames.len(), repeat, "scripted camera streaming");
            let pause = interval.max(Duration::from_millis(1));
            loop {
                for frame in &frames {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(interval);
                    if tx.send(frame.clone()).is_err() {
                        return;
                    }
                }
                if !repeat {
                    return;
                }
                if frames.is_empty() {
                    // Keep the feed open but quiet.
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(pause);
                }
            }
        });

        Ok(rx)
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Camera whose permission is always denied.
#[derive(Debug, Default)]
pub struct DeniedCamera;

impl FrameSource for DeniedCamera {
    fn open(&mut self) -> Result<Receiver<Frame>> {
        Err(SentinelError::Device("camera permission denied".into()))
    }

    fn close(&mut self) {}
}

/// Detector that replays scripted per-frame results; the final entry
/// repeats once the script is exhausted.
pub struct ScriptedDetector {
    script: Vec<Vec<Region>>,
    idx: usize,
}

impl ScriptedDetector {
    pub fn script(script: Vec<Vec<Region>>) -> Self {
        Self { script, idx: 0 }
    }

    /// Same result for every frame.
    pub fn always(regions: Vec<Region>) -> Self {
        Self::script(vec![regions])
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _input: &GrayImage) -> Result<Vec<Region>> {
        let result = self
            .script
            .get(self.idx)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_default();
        if self.idx < self.script.len() {
            self.idx += 1;
        }
        Ok(result)
    }
}

/// Backend producing scripted detectors without touching the network.
pub struct ScriptedDetectorBackend {
    face_script: Vec<Vec<Region>>,
    eye_script: Vec<Vec<Region>>,
}

impl ScriptedDetectorBackend {
    pub fn new(face_script: Vec<Vec<Region>>, eye_script: Vec<Vec<Region>>) -> Self {
        Self {
            face_script,
            eye_script,
        }
    }

    /// A face always present with visible eyes — the "user is fine" script.
    pub fn attentive() -> Self {
        Self::new(
            vec![vec![Region::new(8, 8, 48, 48)]],
            vec![vec![Region::new(4, 4, 8, 8), Region::new(20, 4, 8, 8)]],
        )
    }
}

impl DetectorBackend for ScriptedDetectorBackend {
    fn load(&mut self) -> Result<DetectorPair> {
        Ok(DetectorPair {
            face: Box::new(ScriptedDetector::script(self.face_script.clone())),
            eye: Box::new(ScriptedDetector::script(self.eye_script.clone())),
        })
    }
}

/// Backend whose artifact load always fails.
pub struct FailingDetectorBackend;

impl DetectorBackend for FailingDetectorBackend {
    fn load(&mut self) -> Result<DetectorPair> {
        Err(SentinelError::ResourceLoad(
            "classifier artifact unavailable".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_detector_repeats_last_entry() {
        let mut detector =
            ScriptedDetector::script(vec![vec![Region::new(0, 0, 2, 2)], vec![]]);
        let input = GrayImage::from_pixel(4, 4, image::Luma([0u8]));

        assert_eq!(detector.detect(&input).unwrap().len(), 1);
        assert!(detector.detect(&input).unwrap().is_empty());
        assert!(detector.detect(&input).unwrap().is_empty());
    }

    #[test]
    fn scripted_source_streams_then_disconnects() {
        let mut source = ScriptedFrameSource::new(
            vec![Frame::solid(2, 2, 1, 2, 3); 3],
            Duration::from_millis(1),
            false,
        );
        let rx = source.open().expect("open scripted source");

        let mut received = 0;
        while rx.recv_timeout(Duration::from_millis(200)).is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
        source.close();
    }

    #[test]
    fn scripted_source_rejects_double_open() {
        let mut source =
            ScriptedFrameSource::new(vec![], Duration::from_millis(1), true);
        let _rx = source.open().expect("first open");
        assert!(matches!(
            source.open(),
            Err(SentinelError::Device(_))
        ));
    }

    #[test]
    fn denied_camera_reports_device_error() {
        let mut camera = DeniedCamera;
        assert!(matches!(camera.open(), Err(SentinelError::Device(_))));
        camera.close(); // idempotent even though open failed
    }
}
