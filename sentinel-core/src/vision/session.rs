//! The blocking vision session loop.
//!
//! ## Stages (per session)
//!
//! ```text
//! 1. Open the camera            → Device failure ends the session
//! 2. Load face + eye detectors  → ResourceLoad failure ends the session
//! 3. Drain frames until stopped: preprocess → FrameAnalyzer → maybe Panic
//! 4. Close the camera, report Ended
//! ```
//!
//! The loop runs inside `tokio::task::spawn_blocking`; the coordinator owns
//! the `running` flag and flips it to request teardown. Every event carries
//! the arm epoch so the coordinator can discard signals from a session that
//! was already cancelled — a panic decision computed just before a reset
//! must never escalate after it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SentinelError;
use crate::events::EscalationTrigger;

use super::analyzer::{AnalyzerConfig, FrameAnalyzer};
use super::preprocess;
use super::{CameraHandle, DetectorBackendHandle};

/// Poll granularity for the frame feed; bounds how long a stop request can
/// go unnoticed when the camera stalls.
const FRAME_POLL: Duration = Duration::from_millis(50);

/// What a vision session tells the coordinator.
#[derive(Debug)]
pub enum VisionEvent {
    /// Camera open and detectors loaded; frames are being analysed.
    Started,
    /// Session aborted before or during monitoring; all resources released.
    Failed(SentinelError),
    /// A panic streak limit was exceeded (at most once per session).
    Panic(EscalationTrigger),
    /// The loop exited after a stop request or feed disconnect.
    Ended,
}

/// Everything one session run needs, passed as one struct so the
/// `spawn_blocking` closure stays tidy.
pub struct VisionSessionContext {
    pub camera: CameraHandle,
    pub detectors: DetectorBackendHandle,
    pub config: AnalyzerConfig,
    pub running: Arc<AtomicBool>,
    /// Arm epoch this session was started under.
    pub epoch: u64,
    pub events: mpsc::UnboundedSender<(u64, VisionEvent)>,
}

/// Run one vision session to completion. Blocking.
pub fn run(ctx: VisionSessionContext) {
    let epoch = ctx.epoch;
    let send = |event: VisionEvent| {
        let _ = ctx.events.send((epoch, event));
    };

    let feed = match ctx.camera.0.lock().open() {
        Ok(feed) => feed,
        Err(e) => {
            warn!(error = %e, "camera open failed — vision session inactive");
            ctx.running.store(false, Ordering::SeqCst);
            send(VisionEvent::Failed(e));
            return;
        }
    };

    let pair = match ctx.detectors.0.lock().load() {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "detector load failed — vision session inactive");
            ctx.camera.0.lock().close();
            ctx.running.store(false, Ordering::SeqCst);
            send(VisionEvent::Failed(e));
            return;
        }
    };

    let mut analyzer = FrameAnalyzer::new(pair, ctx.config);
    send(VisionEvent::Started);
    info!(epoch, "vision session monitoring");

    let mut frames_in = 0usize;
    let mut frames_skipped = 0usize;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let frame = match feed.recv_timeout(FRAME_POLL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("frame feed disconnected");
                break;
            }
        };

        frames_in += 1;
        let input = preprocess::detector_input(&frame);

        // A stop requested while this frame was in flight wins over any
        // panic decision the frame would have produced.
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        match analyzer.observe(&input) {
            Ok(Some(trigger)) => send(VisionEvent::Panic(trigger)),
            Ok(None) => {}
            Err(e) => {
                frames_skipped += 1;
                warn!(error = %e, "detector fault — frame skipped");
            }
        }
    }

    ctx.camera.0.lock().close();
    send(VisionEvent::Ended);
    info!(
        epoch,
        frames_in,
        frames_skipped,
        closed_eye_frames = analyzer.closed_eye_frames(),
        no_face_frames = analyzer.no_face_frames(),
        "vision session stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::stub::{
        DeniedCamera, FailingDetectorBackend, ScriptedDetectorBackend, ScriptedFrameSource,
    };
    use crate::vision::{Frame, Region};

    fn recv_event(
        rx: &mut mpsc::UnboundedReceiver<(u64, VisionEvent)>,
    ) -> Option<(u64, VisionEvent)> {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match rx.try_recv() {
                Ok(ev) => return Some(ev),
                Err(mpsc::error::TryRecvError::Empty) => {
                    if std::time::Instant::now() >= deadline {
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(mpsc::error::TryRecvError::Disconnected) => return None,
            }
        }
    }

    #[test]
    fn denied_camera_fails_and_clears_running() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        run(VisionSessionContext {
            camera: CameraHandle::new(DeniedCamera),
            detectors: DetectorBackendHandle::new(ScriptedDetectorBackend::attentive()),
            config: AnalyzerConfig::default(),
            running: Arc::clone(&running),
            epoch: 3,
            events: tx,
        });

        let (epoch, event) = recv_event(&mut rx).expect("failure event");
        assert_eq!(epoch, 3);
        assert!(matches!(event, VisionEvent::Failed(SentinelError::Device(_))));
        assert!(!running.load(Ordering::SeqCst));
        assert!(recv_event(&mut rx).is_none(), "no further events expected");
    }

    #[test]
    fn detector_load_failure_ends_session_like_device_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        run(VisionSessionContext {
            camera: CameraHandle::new(ScriptedFrameSource::new(
                vec![Frame::solid(8, 8, 90, 90, 90)],
                Duration::from_millis(1),
                true,
            )),
            detectors: DetectorBackendHandle::new(FailingDetectorBackend),
            config: AnalyzerConfig::default(),
            running: Arc::clone(&running),
            epoch: 0,
            events: tx,
        });

        let (_, event) = recv_event(&mut rx).expect("failure event");
        assert!(matches!(
            event,
            VisionEvent::Failed(SentinelError::ResourceLoad(_))
        ));
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn closed_eye_streak_signals_panic_once_and_keeps_running() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        let camera = CameraHandle::new(ScriptedFrameSource::new(
            vec![Frame::solid(32, 32, 120, 120, 120)],
            Duration::from_millis(1),
            true,
        ));
        // Face present, eyes never found.
        let detectors = DetectorBackendHandle::new(ScriptedDetectorBackend::new(
            vec![vec![Region::new(4, 4, 16, 16)]],
            vec![vec![]],
        ));

        let ctx = VisionSessionContext {
            camera,
            detectors,
            config: AnalyzerConfig {
                closed_eye_frame_limit: 5,
                no_face_frame_limit: 90,
            },
            running: Arc::clone(&running),
            epoch: 7,
            events: tx,
        };

        let handle = std::thread::spawn(move || run(ctx));

        let (_, started) = recv_event(&mut rx).expect("started event");
        assert!(matches!(started, VisionEvent::Started));

        let (epoch, panic) = recv_event(&mut rx).expect("panic event");
        assert_eq!(epoch, 7);
        assert!(matches!(
            panic,
            VisionEvent::Panic(EscalationTrigger::EyesClosed)
        ));

        // Latched: stopping now should yield Ended with no second panic.
        running.store(false, Ordering::SeqCst);
        handle.join().expect("session thread");

        let (_, last) = recv_event(&mut rx).expect("ended event");
        assert!(matches!(last, VisionEvent::Ended));
        assert!(recv_event(&mut rx).is_none());
    }

    #[test]
    fn stop_request_ends_session_without_panic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        let ctx = VisionSessionContext {
            camera: CameraHandle::new(ScriptedFrameSource::new(
                vec![Frame::solid(16, 16, 60, 60, 60)],
                Duration::from_millis(2),
                true,
            )),
            detectors: DetectorBackendHandle::new(ScriptedDetectorBackend::attentive()),
            config: AnalyzerConfig::default(),
            running: Arc::clone(&running),
            epoch: 1,
            events: tx,
        };

        let handle = std::thread::spawn(move || run(ctx));
        let (_, started) = recv_event(&mut rx).expect("started event");
        assert!(matches!(started, VisionEvent::Started));

        running.store(false, Ordering::SeqCst);
        handle.join().expect("session thread");

        let (_, event) = recv_event(&mut rx).expect("ended event");
        assert!(matches!(event, VisionEvent::Ended));
    }
}
