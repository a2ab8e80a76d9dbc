//! Scripted dictation implementations for tests and the demo host.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::error::{Result, SentinelError};

use super::{Announcer, RecognitionUpdate, SpeechRecognizer};

/// Recognizer that replays scripted updates on a background thread.
pub struct ScriptedRecognizer {
    script: Vec<RecognitionUpdate>,
    delay: Duration,
    running: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<RecognitionUpdate>, delay: Duration) -> Self {
        Self {
            script,
            delay,
            running: Arc::new(AtomicBool::new(false)),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter incremented on every `stop()` call.
    pub fn stop_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start(&mut self, sink: Sender<RecognitionUpdate>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SentinelError::Recognition(
                "recognizer already running".into(),
            ));
        }

        let script = self.script.clone();
        let delay = self.delay;
        let running = Arc::clone(&self.running);

        std::thread::spawn(move || {
            for update in script {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(delay);
                if sink.send(update).is_err() {
                    return;
                }
            }
            // Script exhausted: stay silent until stopped, keeping the
            // update feed open like a real continuous engine.
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(10));
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedRecognizer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Recognizer for runtimes without speech recognition.
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

impl SpeechRecognizer for UnsupportedRecognizer {
    fn start(&mut self, _sink: Sender<RecognitionUpdate>) -> Result<()> {
        Err(SentinelError::Unsupported(
            "speech recognition not available in this runtime".into(),
        ))
    }

    fn stop(&mut self) {}
}

/// Announcer that records every message, for assertions.
#[derive(Default)]
pub struct RecordingAnnouncer {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingAnnouncer {
    pub fn messages(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.messages)
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&mut self, text: &str) {
        self.messages.lock().push(text.to_string());
    }
}
