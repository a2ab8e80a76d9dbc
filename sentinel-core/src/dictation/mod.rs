//! Voice dictation fallback.
//!
//! When keyboard and pointer input stop, dictation offers an alternate
//! "I am still present" channel: a platform speech recognizer streams
//! interim and final transcript segments, and the first captured final
//! speech is appended to the intake notes *and* counted as activity — which
//! resets the ladder and tears the session down. Dictation is a one-shot
//! rescue, not a standing input mode.
//!
//! Recognition itself is a runtime capability behind `SpeechRecognizer`;
//! a runtime without one degrades the fallback to `unsupported` rather than
//! failing the coordinator.

pub mod session;
pub mod stub;

use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Distinguishes streaming hypotheses from committed recognition results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Streaming hypothesis — text may still change.
    Interim,
    /// Committed — the utterance is complete and will not change.
    Final,
}

/// One recognised speech segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub kind: SegmentKind,
}

impl TranscriptSegment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: SegmentKind::Interim,
        }
    }

    pub fn final_(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: SegmentKind::Final,
        }
    }
}

/// What a recognizer pushes into its session.
#[derive(Debug, Clone)]
pub enum RecognitionUpdate {
    /// One result event: all segments recognised since the previous event.
    Results(Vec<TranscriptSegment>),
    /// Engine fault. Terminal for the session, not for the coordinator.
    Error(String),
}

/// Contract for platform speech recognition engines.
pub trait SpeechRecognizer: Send + 'static {
    /// Begin continuous interim+final recognition, pushing updates into
    /// `sink` until `stop()` is called.
    ///
    /// # Errors
    /// `SentinelError::Unsupported` when the runtime has no recognition
    /// capability; `SentinelError::Recognition` when the engine exists but
    /// fails to start.
    fn start(&mut self, sink: Sender<RecognitionUpdate>) -> Result<()>;

    /// Stop recognition and release the engine. Idempotent; safe to call
    /// whether or not `start()` succeeded.
    fn stop(&mut self);
}

/// Thread-safe reference-counted handle to any `SpeechRecognizer`.
#[derive(Clone)]
pub struct RecognizerHandle(pub Arc<Mutex<dyn SpeechRecognizer>>);

impl RecognizerHandle {
    pub fn new<R: SpeechRecognizer>(recognizer: R) -> Self {
        Self(Arc::new(Mutex::new(recognizer)))
    }
}

impl std::fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerHandle").finish_non_exhaustive()
    }
}

/// Best-effort spoken announcement of dictation activation, so the user
/// understands why the microphone turned on. Missing speech synthesis is
/// not an error — implementations simply no-op.
pub trait Announcer: Send + 'static {
    fn announce(&mut self, text: &str);
}

/// Thread-safe reference-counted handle to any `Announcer`.
#[derive(Clone)]
pub struct AnnouncerHandle(pub Arc<Mutex<dyn Announcer>>);

impl AnnouncerHandle {
    pub fn new<A: Announcer>(announcer: A) -> Self {
        Self(Arc::new(Mutex::new(announcer)))
    }
}

impl std::fmt::Debug for AnnouncerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncerHandle").finish_non_exhaustive()
    }
}

/// Announcer for runtimes without speech synthesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAnnouncer;

impl Announcer for NullAnnouncer {
    fn announce(&mut self, _text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_kind_serializes_lowercase() {
        let segment = TranscriptSegment::final_("hello");
        let json = serde_json::to_value(&segment).expect("serialize segment");
        assert_eq!(json["kind"], "final");
        assert_eq!(json["text"], "hello");
    }

    #[test]
    fn interim_constructor_sets_kind() {
        assert_eq!(TranscriptSegment::interim("x").kind, SegmentKind::Interim);
        assert_eq!(TranscriptSegment::final_("x").kind, SegmentKind::Final);
    }
}
