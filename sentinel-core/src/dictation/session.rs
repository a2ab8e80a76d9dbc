//! The blocking dictation session loop.
//!
//! Mirrors the vision session: start the recognizer (capability failures end
//! the session before it ever reports active), announce activation, then
//! forward the final segments of each result event to the coordinator until
//! stopped. Recognizer faults terminate this session only.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SentinelError;

use super::{AnnouncerHandle, RecognitionUpdate, RecognizerHandle, SegmentKind};

/// Poll granularity for recognizer updates.
const RESULT_POLL: Duration = Duration::from_millis(50);

/// Spoken when dictation activates.
pub const ACTIVATION_ANNOUNCEMENT: &str =
    "No input has been detected for a while. Voice dictation is now active — \
     anything you say will be added to your intake notes.";

/// What a dictation session tells the coordinator.
#[derive(Debug)]
pub enum DictationEvent {
    /// Recognizer live; activation announced.
    Started,
    /// The runtime offers no recognition capability. Not treated as
    /// activity; the fallback stays disabled.
    Unsupported(SentinelError),
    /// Recognizer fault after start. Terminal for this session only.
    Failed(SentinelError),
    /// Concatenated final transcript text of one result event.
    Transcript(String),
    /// Loop exited after a stop request.
    Ended,
}

pub struct DictationSessionContext {
    pub recognizer: RecognizerHandle,
    pub announcer: AnnouncerHandle,
    pub running: Arc<AtomicBool>,
    /// Arm epoch this session was started under.
    pub epoch: u64,
    pub events: mpsc::UnboundedSender<(u64, DictationEvent)>,
}

/// Run one dictation session to completion. Blocking.
pub fn run(ctx: DictationSessionContext) {
    let epoch = ctx.epoch;
    let send = |event: DictationEvent| {
        let _ = ctx.events.send((epoch, event));
    };

    let (update_tx, update_rx) = unbounded();

    if let Err(e) = ctx.recognizer.0.lock().start(update_tx) {
        ctx.running.store(false, Ordering::SeqCst);
        match e {
            SentinelError::Unsupported(_) => {
                info!(error = %e, "speech recognition unavailable — dictation disabled");
                send(DictationEvent::Unsupported(e));
            }
            other => {
                warn!(error = %other, "recognizer failed to start");
                send(DictationEvent::Failed(other));
            }
        }
        return;
    }

    // Best-effort: a missing synthesizer must not block the fallback.
    ctx.announcer.0.lock().announce(ACTIVATION_ANNOUNCEMENT);
    send(DictationEvent::Started);
    info!(epoch, "dictation session listening");

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        match update_rx.recv_timeout(RESULT_POLL) {
            Ok(RecognitionUpdate::Results(segments)) => {
                let text = final_text(&segments);

                // A stop requested while this result was in flight wins.
                if !ctx.running.load(Ordering::Relaxed) {
                    break;
                }
                if !text.is_empty() {
                    debug!(chars = text.len(), "final speech captured");
                    send(DictationEvent::Transcript(text));
                }
            }
            Ok(RecognitionUpdate::Error(message)) => {
                warn!(%message, "recognizer fault — ending dictation session");
                ctx.recognizer.0.lock().stop();
                ctx.running.store(false, Ordering::SeqCst);
                send(DictationEvent::Failed(SentinelError::Recognition(message)));
                return;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("recognizer update feed disconnected");
                break;
            }
        }
    }

    ctx.recognizer.0.lock().stop();
    send(DictationEvent::Ended);
    info!(epoch, "dictation session stopped");
}

/// Concatenate the final (non-interim) segments of one result event.
fn final_text(segments: &[super::TranscriptSegment]) -> String {
    let mut text = String::new();
    for segment in segments {
        if segment.kind != SegmentKind::Final {
            continue;
        }
        let trimmed = segment.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(trimmed);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictation::stub::{
        RecordingAnnouncer, ScriptedRecognizer, UnsupportedRecognizer,
    };
    use crate::dictation::TranscriptSegment;

    fn recv_event(
        rx: &mut mpsc::UnboundedReceiver<(u64, DictationEvent)>,
    ) -> Option<(u64, DictationEvent)> {
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
    fn final_text_skips_interim_and_blank_segments() {
        let segments = vec![
            TranscriptSegment::interim("chest fee"),
            TranscriptSegment::final_("chest feels tight"),
            TranscriptSegment::final_("   "),
            TranscriptSegment::final_("since morning"),
        ];
        assert_eq!(final_text(&segments), "chest feels tight since morning");
    }

    #[test]
    fn unsupported_recognizer_disables_fallback_without_activity() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let announcer = RecordingAnnouncer::default();
        let spoken = announcer.messages();

        run(DictationSessionContext {
            recognizer: RecognizerHandle::new(UnsupportedRecognizer),
            announcer: AnnouncerHandle::new(announcer),
            running: Arc::clone(&running),
            epoch: 2,
            events: tx,
        });

        let (epoch, event) = recv_event(&mut rx).expect("unsupported event");
        assert_eq!(epoch, 2);
        assert!(matches!(event, DictationEvent::Unsupported(_)));
        assert!(!running.load(Ordering::SeqCst));
        // No announcement when the engine never started.
        assert!(spoken.lock().is_empty());
    }

    #[test]
    fn final_results_are_forwarded_after_announcement() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let announcer = RecordingAnnouncer::default();
        let spoken = announcer.messages();

        let recognizer = ScriptedRecognizer::new(
            vec![
                RecognitionUpdate::Results(vec![TranscriptSegment::interim("help m")]),
                RecognitionUpdate::Results(vec![TranscriptSegment::final_("help me please")]),
            ],
            Duration::from_millis(5),
        );
        let stops = recognizer.stop_count();

        let ctx = DictationSessionContext {
            recognizer: RecognizerHandle::new(recognizer),
            announcer: AnnouncerHandle::new(announcer),
            running: Arc::clone(&running),
            epoch: 5,
            events: tx,
        };
        let handle = std::thread::spawn(move || run(ctx));

        let (_, started) = recv_event(&mut rx).expect("started event");
        assert!(matches!(started, DictationEvent::Started));
        assert_eq!(spoken.lock().as_slice(), &[ACTIVATION_ANNOUNCEMENT]);

        let (_, transcript) = recv_event(&mut rx).expect("transcript event");
        match transcript {
            DictationEvent::Transcript(text) => assert_eq!(text, "help me please"),
            other => panic!("expected transcript, got {other:?}"),
        }

        running.store(false, Ordering::SeqCst);
        handle.join().expect("session thread");
        let (_, last) = recv_event(&mut rx).expect("ended event");
        assert!(matches!(last, DictationEvent::Ended));
        assert!(stops.load(Ordering::SeqCst) >= 1, "recognizer released");
    }

    #[test]
    fn recognizer_error_terminates_session_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        let recognizer = ScriptedRecognizer::new(
            vec![RecognitionUpdate::Error("audio capture lost".into())],
            Duration::from_millis(5),
        );
        let stops = recognizer.stop_count();

        let ctx = DictationSessionContext {
            recognizer: RecognizerHandle::new(recognizer),
            announcer: AnnouncerHandle::new(crate::dictation::NullAnnouncer),
            running: Arc::clone(&running),
            epoch: 0,
            events: tx,
        };
        let handle = std::thread::spawn(move || run(ctx));
        handle.join().expect("session thread");

        let (_, started) = recv_event(&mut rx).expect("started event");
        assert!(matches!(started, DictationEvent::Started));
        let (_, failed) = recv_event(&mut rx).expect("failed event");
        assert!(matches!(
            failed,
            DictationEvent::Failed(SentinelError::Recognition(_))
        ));
        assert!(!running.load(Ordering::SeqCst));
        assert!(stops.load(Ordering::SeqCst) >= 1);
    }
}
