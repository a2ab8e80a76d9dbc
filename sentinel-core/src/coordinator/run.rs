//! The coordinator run loop.
//!
//! ## Event sources (one `select!`, commands before ticks)
//!
//! ```text
//! shutdown token        → teardown and exit
//! host commands         → activity reset / manual trigger / countdown
//! vision session events → started / failed / panic / ended
//! dictation events      → started / unsupported / failed / transcript / ended
//! dispatch results      → outcome summary or failure report
//! periodic tick         → threshold ladder (vision, dictation + countdown)
//! ```
//!
//! ## Staleness
//!
//! `epoch` increments on every activity reset. Sessions and the countdown
//! are tagged with the epoch they were armed under and every signal they
//! emit carries it; signals from a previous epoch are discarded. This is
//! what guarantees that an escalate decision computed just before a reset
//! can never fire after it.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    activity::ActivityTracker,
    contacts::ContactDirectory,
    dictation::session::{self as dictation_session, DictationEvent, DictationSessionContext},
    dispatch::{EmergencyOutcome, EmergencyRequest},
    error::SentinelError,
    events::{EscalationLevel, EscalationTrigger, SentinelEvent, Subsystem, SubsystemStatus},
    intake::SharedIntake,
    vision::session::{self as vision_session, VisionEvent, VisionSessionContext},
};

use super::{Command, CoordinatorConfig, EngineDevices, StatusBoard};

/// Everything the run loop needs, passed as one struct so `start()` stays
/// tidy.
pub(crate) struct RunContext {
    pub config: CoordinatorConfig,
    pub devices: EngineDevices,
    pub activity: ActivityTracker,
    pub intake: SharedIntake,
    pub contacts: ContactDirectory,
    pub cmd_tx: mpsc::UnboundedSender<Command>,
    pub cmd_rx: mpsc::UnboundedReceiver<Command>,
    pub events_tx: broadcast::Sender<SentinelEvent>,
    pub level: Arc<Mutex<EscalationLevel>>,
    pub statuses: Arc<Mutex<StatusBoard>>,
    pub seq: Arc<AtomicU64>,
    pub shutdown: CancellationToken,
}

/// A running vision or dictation session, as the coordinator sees it.
///
/// Dropping it requests the session loop to stop, so sessions cannot leak
/// their devices even if the run task is torn down abruptly.
struct ActiveSession {
    running: Arc<AtomicBool>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

pub(crate) async fn run(ctx: RunContext) {
    let RunContext {
        config,
        devices,
        activity,
        intake,
        contacts,
        cmd_tx,
        mut cmd_rx,
        events_tx,
        level,
        statuses,
        seq,
        shutdown,
    } = ctx;

    let (vision_tx, mut vision_rx) = mpsc::unbounded_channel();
    let (dictation_tx, mut dictation_rx) = mpsc::unbounded_channel();
    let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel();

    let mut runner = Runner {
        config,
        devices,
        activity,
        intake,
        contacts,
        cmd_tx,
        events_tx,
        level,
        statuses,
        seq,
        vision_tx,
        dictation_tx,
        dispatch_tx,
        epoch: 0,
        vision: None,
        dictation: None,
        countdown: None,
        vision_attempted: false,
        dictation_attempted: false,
    };

    let mut interval = tokio::time::interval(runner.config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        poll_interval = ?runner.config.poll_interval,
        vision_after = ?runner.config.vision_after,
        dictation_after = ?runner.config.dictation_after,
        silence_countdown = ?runner.config.silence_countdown,
        "coordinator run loop started"
    );

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            Some(cmd) = cmd_rx.recv() => runner.handle_command(cmd),

            Some((epoch, event)) = vision_rx.recv() => runner.handle_vision(epoch, event),

            Some((epoch, event)) = dictation_rx.recv() => runner.handle_dictation(epoch, event),

            Some(result) = dispatch_rx.recv() => runner.handle_dispatch_result(result),

            _ = interval.tick() => runner.handle_tick(),
        }
    }

    runner.stop_sessions(SubsystemStatus::Paused, "coordinator shutdown");
    runner.cancel_countdown();
    info!("coordinator run loop stopped");
}

struct Runner {
    config: CoordinatorConfig,
    devices: EngineDevices,
    activity: ActivityTracker,
    intake: SharedIntake,
    contacts: ContactDirectory,
    cmd_tx: mpsc::UnboundedSender<Command>,
    events_tx: broadcast::Sender<SentinelEvent>,
    level: Arc<Mutex<EscalationLevel>>,
    statuses: Arc<Mutex<StatusBoard>>,
    seq: Arc<AtomicU64>,
    vision_tx: mpsc::UnboundedSender<(u64, VisionEvent)>,
    dictation_tx: mpsc::UnboundedSender<(u64, DictationEvent)>,
    dispatch_tx: mpsc::UnboundedSender<Result<EmergencyOutcome, SentinelError>>,
    /// Bumped on every activity reset; stale session signals are dropped.
    epoch: u64,
    vision: Option<ActiveSession>,
    dictation: Option<ActiveSession>,
    countdown: Option<CancellationToken>,
    /// Whether vision was armed during the current inactivity cycle.
    vision_attempted: bool,
    dictation_attempted: bool,
}

impl Runner {
    // ── Event handlers ───────────────────────────────────────────────────

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Activity => self.reset(),
            Command::Manual => {
                if self.current_level() == EscalationLevel::Escalated {
                    debug!("manual trigger ignored — already escalated");
                } else {
                    self.escalate(EscalationTrigger::Manual);
                }
            }
            Command::CountdownFired { epoch } => {
                if epoch != self.epoch {
                    debug!(epoch, current = self.epoch, "stale countdown discarded");
                } else if self.current_level() < EscalationLevel::Escalated {
                    self.escalate(EscalationTrigger::SilenceAfterPrompt);
                }
            }
        }
    }

    fn handle_tick(&mut self) {
        if self.current_level() >= EscalationLevel::Escalated {
            return;
        }

        let elapsed = self.activity.elapsed();

        if elapsed >= self.config.vision_after && !self.vision_attempted {
            self.arm_vision();
        }
        // Independent threshold from the same timestamp: a long-idle session
        // reaches both, and arming dictation never tears vision down.
        if elapsed >= self.config.dictation_after && !self.dictation_attempted {
            self.arm_dictation();
        }
    }

    fn handle_vision(&mut self, epoch: u64, event: VisionEvent) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, ?event, "stale vision event discarded");
            return;
        }

        match event {
            VisionEvent::Started => {
                self.set_status(Subsystem::Vision, SubsystemStatus::Monitoring, None);
            }
            VisionEvent::Failed(e) => {
                self.vision = None;
                self.set_status(
                    Subsystem::Vision,
                    SubsystemStatus::Failed,
                    Some(e.to_string()),
                );
            }
            VisionEvent::Panic(trigger) => {
                if self.current_level() < EscalationLevel::Escalated {
                    self.escalate(trigger);
                }
            }
            VisionEvent::Ended => {
                // Expected after an escalation teardown (session already
                // taken); anything else means the feed died under us.
                if self.vision.take().is_some() {
                    self.set_status(
                        Subsystem::Vision,
                        SubsystemStatus::Failed,
                        Some("camera feed ended unexpectedly".into()),
                    );
                }
            }
        }
    }

    fn handle_dictation(&mut self, epoch: u64, event: DictationEvent) {
        let stale = epoch != self.epoch;
        match event {
            // Captured speech is real user input even if the session was
            // torn down while the result was in flight: keep the text,
            // count the activity.
            DictationEvent::Transcript(text) => {
                self.intake.lock().append_notes(&text);
                let seq = self.next_seq();
                self.emit(SentinelEvent::Notes { seq, text });
                self.activity.mark();
                self.reset();
            }
            event if stale => {
                debug!(epoch, current = self.epoch, ?event, "stale dictation event discarded");
            }
            DictationEvent::Started => {
                self.set_status(Subsystem::Dictation, SubsystemStatus::Enabled, None);
            }
            DictationEvent::Unsupported(e) => {
                self.dictation = None;
                self.set_status(
                    Subsystem::Dictation,
                    SubsystemStatus::Unsupported,
                    Some(e.to_string()),
                );
            }
            DictationEvent::Failed(e) => {
                self.dictation = None;
                self.set_status(
                    Subsystem::Dictation,
                    SubsystemStatus::Failed,
                    Some(e.to_string()),
                );
            }
            DictationEvent::Ended => {
                if self.dictation.take().is_some() {
                    self.set_status(
                        Subsystem::Dictation,
                        SubsystemStatus::Failed,
                        Some("recognizer ended unexpectedly".into()),
                    );
                }
            }
        }
    }

    fn handle_dispatch_result(&mut self, result: Result<EmergencyOutcome, SentinelError>) {
        let seq = self.next_seq();
        match result {
            Ok(outcome) => {
                let summary = outcome.summary();
                info!(%summary, "escalation dispatched");
                self.emit(SentinelEvent::Dispatch {
                    seq,
                    delivered: true,
                    summary,
                    at: Utc::now(),
                });
            }
            Err(e) => {
                // Reported, never retried; the level stays Escalated.
                warn!(error = %e, "escalation dispatch failed");
                self.emit(SentinelEvent::Dispatch {
                    seq,
                    delivered: false,
                    summary: format!("dispatch failed: {e}"),
                    at: Utc::now(),
                });
            }
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// The single reconciliation point: cancel everything, return to Idle.
    fn reset(&mut self) {
        self.epoch += 1;
        self.stop_sessions(SubsystemStatus::Paused, "activity resumed");
        self.cancel_countdown();
        self.vision_attempted = false;
        self.dictation_attempted = false;

        if self.current_level() != EscalationLevel::Idle {
            self.set_level(EscalationLevel::Idle, None);
            info!("activity recorded — escalation reset to idle");
        }
    }

    fn arm_vision(&mut self) {
        self.vision_attempted = true;
        let running = Arc::new(AtomicBool::new(true));
        self.vision = Some(ActiveSession {
            running: Arc::clone(&running),
        });

        let session_ctx = VisionSessionContext {
            camera: self.devices.camera.clone(),
            detectors: self.devices.detectors.clone(),
            config: self.config.analyzer,
            running,
            epoch: self.epoch,
            events: self.vision_tx.clone(),
        };
        tokio::task::spawn_blocking(move || vision_session::run(session_ctx));

        self.raise_level(EscalationLevel::VisionArmed);
        info!(epoch = self.epoch, "vision monitor armed");
    }

    fn arm_dictation(&mut self) {
        self.dictation_attempted = true;
        let running = Arc::new(AtomicBool::new(true));
        self.dictation = Some(ActiveSession {
            running: Arc::clone(&running),
        });

        let session_ctx = DictationSessionContext {
            recognizer: self.devices.recognizer.clone(),
            announcer: self.devices.announcer.clone(),
            running,
            epoch: self.epoch,
            events: self.dictation_tx.clone(),
        };
        tokio::task::spawn_blocking(move || dictation_session::run(session_ctx));

        self.raise_level(EscalationLevel::DictationArmed);
        self.arm_countdown();
        info!(epoch = self.epoch, "dictation fallback armed");
    }

    fn arm_countdown(&mut self) {
        let token = CancellationToken::new();
        self.countdown = Some(token.clone());

        let cmd_tx = self.cmd_tx.clone();
        let epoch = self.epoch;
        let delay = self.config.silence_countdown;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = cmd_tx.send(Command::CountdownFired { epoch });
                }
            }
        });
    }

    fn escalate(&mut self, trigger: EscalationTrigger) {
        // Latch: one dispatch per escalation event. Only a fresh activity
        // reset re-arms this.
        if self.current_level() == EscalationLevel::Escalated {
            return;
        }

        warn!(reason = trigger.reason(), "escalating");
        self.stop_sessions(SubsystemStatus::Paused, "escalation fired");
        self.cancel_countdown();
        self.set_level(EscalationLevel::Escalated, Some(trigger.reason().to_string()));

        let request = self.assemble_request(trigger);
        let dispatcher = Arc::clone(&self.devices.dispatcher);
        let result_tx = self.dispatch_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = dispatcher.dispatch(&request);
            let _ = result_tx.send(result);
        });
    }

    /// Build the payload at the moment of escalation so it carries the
    /// latest vitals, location and contacts.
    fn assemble_request(&self, trigger: EscalationTrigger) -> EmergencyRequest {
        let (vitals, extra_contacts) = {
            let form = self.intake.lock();
            (form.vitals_snapshot(), form.emergency_contacts.clone())
        };
        let contacts = self
            .contacts
            .resolve(extra_contacts.iter().map(String::as_str));
        if contacts.is_empty() {
            warn!("no emergency contacts resolved — dispatch service decides the fallback");
        }
        let point = self.devices.location.current();

        EmergencyRequest {
            reason: trigger.reason().to_string(),
            vitals,
            latitude: point.map(|p| p.latitude),
            longitude: point.map(|p| p.longitude),
            contacts,
        }
    }

    // ── Session / countdown teardown ─────────────────────────────────────

    fn stop_sessions(&mut self, status: SubsystemStatus, detail: &str) {
        if let Some(session) = self.vision.take() {
            drop(session);
            self.set_status(Subsystem::Vision, status, Some(detail.to_string()));
        }
        if let Some(session) = self.dictation.take() {
            drop(session);
            self.set_status(Subsystem::Dictation, status, Some(detail.to_string()));
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(token) = self.countdown.take() {
            token.cancel();
        }
    }

    // ── State + event plumbing ───────────────────────────────────────────

    fn current_level(&self) -> EscalationLevel {
        *self.level.lock()
    }

    /// Forward-only transition; never lowers the level.
    fn raise_level(&mut self, target: EscalationLevel) {
        if self.current_level() < target {
            self.set_level(target, None);
        }
    }

    fn set_level(&mut self, level: EscalationLevel, reason: Option<String>) {
        *self.level.lock() = level;
        let seq = self.next_seq();
        self.emit(SentinelEvent::Level { seq, level, reason });
    }

    fn set_status(
        &mut self,
        subsystem: Subsystem,
        status: SubsystemStatus,
        detail: Option<String>,
    ) {
        {
            let mut board = self.statuses.lock();
            let board = &mut *board;
            let (slot, slot_detail) = match subsystem {
                Subsystem::Vision => (&mut board.vision, &mut board.vision_detail),
                Subsystem::Dictation => (&mut board.dictation, &mut board.dictation_detail),
            };
            if *slot == status && *slot_detail == detail {
                return;
            }
            *slot = status;
            *slot_detail = detail.clone();
        }

        let seq = self.next_seq();
        self.emit(SentinelEvent::Status {
            seq,
            subsystem,
            status,
            detail,
        });
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn emit(&self, event: SentinelEvent) {
        // A host with no live subscriber is fine; state snapshots remain
        // queryable through the handle.
        let _ = self.events_tx.send(event);
    }
}
