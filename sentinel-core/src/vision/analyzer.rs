//! Per-frame panic inference.
//!
//! ## Algorithm
//!
//! 1. Run face detection on the preprocessed frame.
//! 2. Zero faces → increment the no-face streak; nothing else changes.
//! 3. One or more faces → reset the no-face streak, crop the first face,
//!    run eye detection inside the crop: zero eyes increments the
//!    closed-eye streak, any eyes reset it.
//! 4. The first streak to exceed its limit escalates, exactly once per
//!    session (latched).
//!
//! Limits are frame counts, not wall-clock: a slow camera takes
//! proportionally longer to cross them. That keeps the decision stable
//! under variable frame rates at the cost of device-dependent latency.

use image::GrayImage;
use tracing::debug;

use crate::error::Result;
use crate::events::EscalationTrigger;

use super::DetectorPair;

/// Streak limits before a panic signal fires.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Consecutive face-found-but-no-eyes frames tolerated. Default: 60.
    pub closed_eye_frame_limit: u32,
    /// Consecutive no-face frames tolerated. Default: 90.
    pub no_face_frame_limit: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            closed_eye_frame_limit: 60,
            no_face_frame_limit: 90,
        }
    }
}

/// Stateful frame-by-frame analyser for one vision session.
pub struct FrameAnalyzer {
    detectors: DetectorPair,
    config: AnalyzerConfig,
    consecutive_closed_eye_frames: u32,
    consecutive_no_face_frames: u32,
    /// One-shot guard: a session signals panic at most once.
    latched: bool,
}

impl FrameAnalyzer {
    pub fn new(detectors: DetectorPair, config: AnalyzerConfig) -> Self {
        Self {
            detectors,
            config,
            consecutive_closed_eye_frames: 0,
            consecutive_no_face_frames: 0,
            latched: false,
        }
    }

    /// Analyse one preprocessed frame. Returns a trigger the first time a
    /// streak limit is exceeded, `None` on every other frame.
    ///
    /// # Errors
    /// Propagates detector faults; the caller decides whether to skip the
    /// frame or end the session.
    pub fn observe(&mut self, input: &GrayImage) -> Result<Option<EscalationTrigger>> {
        let faces = self.detectors.face.detect(input)?;

        if faces.is_empty() {
            self.consecutive_no_face_frames += 1;
        } else {
            self.consecutive_no_face_frames = 0;
            let face_crop = faces[0].crop(input);
            let eyes = self.detectors.eye.detect(&face_crop)?;
            if eyes.is_empty() {
                self.consecutive_closed_eye_frames += 1;
            } else {
                self.consecutive_closed_eye_frames = 0;
            }
        }

        if self.latched {
            return Ok(None);
        }

        let trigger = if self.consecutive_closed_eye_frames > self.config.closed_eye_frame_limit {
            Some(EscalationTrigger::EyesClosed)
        } else if self.consecutive_no_face_frames > self.config.no_face_frame_limit {
            Some(EscalationTrigger::FaceLost)
        } else {
            None
        };

        if let Some(trigger) = trigger {
            self.latched = true;
            debug!(
                closed_eye_frames = self.consecutive_closed_eye_frames,
                no_face_frames = self.consecutive_no_face_frames,
                ?trigger,
                "panic streak limit exceeded"
            );
        }
        Ok(trigger)
    }

    pub fn closed_eye_frames(&self) -> u32 {
        self.consecutive_closed_eye_frames
    }

    pub fn no_face_frames(&self) -> u32 {
        self.consecutive_no_face_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::stub::ScriptedDetector;
    use crate::vision::Region;

    fn input() -> GrayImage {
        GrayImage::from_pixel(32, 32, image::Luma([128u8]))
    }

    fn face_region() -> Region {
        Region::new(4, 4, 16, 16)
    }

    /// face always found, eyes never found
    fn closed_eye_analyzer(limit: u32) -> FrameAnalyzer {
        FrameAnalyzer::new(
            DetectorPair {
                face: Box::new(ScriptedDetector::always(vec![face_region()])),
                eye: Box::new(ScriptedDetector::always(vec![])),
            },
            AnalyzerConfig {
                closed_eye_frame_limit: limit,
                no_face_frame_limit: 90,
            },
        )
    }

    #[test]
    fn eye_closure_fires_exactly_on_the_transition_past_the_limit() {
        let mut analyzer = closed_eye_analyzer(60);
        let frame = input();

        for _ in 0..60 {
            assert_eq!(analyzer.observe(&frame).unwrap(), None);
        }
        assert_eq!(analyzer.closed_eye_frames(), 60);

        // 61st closed-eye frame crosses the limit.
        assert_eq!(
            analyzer.observe(&frame).unwrap(),
            Some(EscalationTrigger::EyesClosed)
        );

        // Latched: the still-running session never fires again.
        for _ in 0..20 {
            assert_eq!(analyzer.observe(&frame).unwrap(), None);
        }
    }

    #[test]
    fn face_loss_fires_exactly_on_the_transition_past_the_limit() {
        let mut analyzer = FrameAnalyzer::new(
            DetectorPair {
                face: Box::new(ScriptedDetector::always(vec![])),
                eye: Box::new(ScriptedDetector::always(vec![face_region()])),
            },
            AnalyzerConfig {
                closed_eye_frame_limit: 60,
                no_face_frame_limit: 90,
            },
        );
        let frame = input();

        for _ in 0..90 {
            assert_eq!(analyzer.observe(&frame).unwrap(), None);
        }
        assert_eq!(
            analyzer.observe(&frame).unwrap(),
            Some(EscalationTrigger::FaceLost)
        );
        assert_eq!(analyzer.observe(&frame).unwrap(), None);
    }

    #[test]
    fn visible_eyes_reset_the_closed_eye_streak() {
        let mut analyzer = FrameAnalyzer::new(
            DetectorPair {
                face: Box::new(ScriptedDetector::always(vec![face_region()])),
                eye: Box::new(ScriptedDetector::script(vec![
                    vec![],
                    vec![],
                    vec![Region::new(2, 2, 4, 4)],
                ])),
            },
            AnalyzerConfig {
                closed_eye_frame_limit: 60,
                no_face_frame_limit: 90,
            },
        );
        let frame = input();

        analyzer.observe(&frame).unwrap();
        analyzer.observe(&frame).unwrap();
        assert_eq!(analyzer.closed_eye_frames(), 2);

        analyzer.observe(&frame).unwrap();
        assert_eq!(analyzer.closed_eye_frames(), 0);
    }

    #[test]
    fn found_face_resets_no_face_streak_but_not_eye_streak() {
        let mut analyzer = FrameAnalyzer::new(
            DetectorPair {
                // two no-face frames, then a face
                face: Box::new(ScriptedDetector::script(vec![
                    vec![],
                    vec![],
                    vec![face_region()],
                ])),
                eye: Box::new(ScriptedDetector::always(vec![])),
            },
            AnalyzerConfig::default(),
        );
        let frame = input();

        analyzer.observe(&frame).unwrap();
        analyzer.observe(&frame).unwrap();
        assert_eq!(analyzer.no_face_frames(), 2);
        assert_eq!(analyzer.closed_eye_frames(), 0);

        // Face returns with closed eyes: no-face streak clears, eye streak
        // starts counting.
        analyzer.observe(&frame).unwrap();
        assert_eq!(analyzer.no_face_frames(), 0);
        assert_eq!(analyzer.closed_eye_frames(), 1);
    }

    #[test]
    fn no_face_frames_do_not_touch_the_eye_streak() {
        let mut analyzer = FrameAnalyzer::new(
            DetectorPair {
                face: Box::new(ScriptedDetector::script(vec![
                    vec![face_region()],
                    vec![],
                    vec![face_region()],
                ])),
                eye: Box::new(ScriptedDetector::always(vec![])),
            },
            AnalyzerConfig::default(),
        );
        let frame = input();

        analyzer.observe(&frame).unwrap(); // closed-eye streak: 1
        analyzer.observe(&frame).unwrap(); // face lost; eye streak untouched
        assert_eq!(analyzer.closed_eye_frames(), 1);
        assert_eq!(analyzer.no_face_frames(), 1);

        analyzer.observe(&frame).unwrap(); // face back, still no eyes
        assert_eq!(analyzer.closed_eye_frames(), 2);
    }
}
