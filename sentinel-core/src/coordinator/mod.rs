//! `EscalationCoordinator` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! EscalationCoordinator::new()
//!     └─► start()          → run loop spawned, periodic check armed
//!         ├─► handle()     → cloneable input surface (activity, manual)
//!         └─► shutdown()   → run loop exits, sessions torn down
//! ```
//!
//! ## Threading
//!
//! The run loop task is the sole mutator of the escalation level. Session
//! loops (camera frames, speech results) and dispatch calls run on
//! `spawn_blocking` threads and talk back over channels; input handlers on
//! any thread mark the activity tracker synchronously and enqueue a reset
//! command. Commands are drained with priority over timer ticks, and every
//! session signal carries the arm epoch it was issued under, so a
//! cancellation always beats a stale escalate decision.

pub(crate) mod run;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    activity::ActivityTracker,
    contacts::ContactDirectory,
    dictation::{AnnouncerHandle, RecognizerHandle},
    dispatch::DispatchHandle,
    error::{Result, SentinelError},
    events::{EscalationLevel, SentinelEvent, Subsystem, SubsystemStatus},
    intake::SharedIntake,
    location::LocationHandle,
    vision::{analyzer::AnalyzerConfig, CameraHandle, DetectorBackendHandle},
};

/// Broadcast capacity: 256 events buffered for slow hosts.
const BROADCAST_CAP: usize = 256;

/// Inactivity thresholds and cadences of the escalation ladder.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Periodic inactivity check cadence. Default: 15 s.
    pub poll_interval: Duration,
    /// Inactivity before vision monitoring arms. Default: 40 s.
    pub vision_after: Duration,
    /// Inactivity before the dictation fallback arms. Default: 5 min.
    pub dictation_after: Duration,
    /// Continued silence after dictation arms before escalating.
    /// Default: 2 min.
    pub silence_countdown: Duration,
    /// Frame-streak limits for the vision analyser.
    pub analyzer: AnalyzerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            vision_after: Duration::from_secs(40),
            dictation_after: Duration::from_secs(5 * 60),
            silence_countdown: Duration::from_secs(2 * 60),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

/// The devices and collaborators one coordinator instance owns.
pub struct EngineDevices {
    pub camera: CameraHandle,
    pub detectors: DetectorBackendHandle,
    pub recognizer: RecognizerHandle,
    pub announcer: AnnouncerHandle,
    pub location: LocationHandle,
    pub dispatcher: DispatchHandle,
}

/// Inputs the host can feed the coordinator.
#[derive(Debug)]
pub(crate) enum Command {
    /// A recognized user input event occurred (tracker already marked).
    Activity,
    /// Explicit emergency trigger, bypasses the threshold ladder.
    Manual,
    /// The post-dictation countdown elapsed under the given arm epoch.
    CountdownFired { epoch: u64 },
}

/// Last known status of both monitored subsystems.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    pub vision: SubsystemStatus,
    pub vision_detail: Option<String>,
    pub dictation: SubsystemStatus,
    pub dictation_detail: Option<String>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self {
            vision: SubsystemStatus::Idle,
            vision_detail: None,
            dictation: SubsystemStatus::Idle,
            dictation_detail: None,
        }
    }
}

/// The escalation state machine.
///
/// All shared fields use interior mutability; wrap in `Arc` to share with
/// event-forwarding tasks if needed. One instance owns its devices — no
/// process-wide globals, so several coordinators (e.g. in tests) coexist.
pub struct EscalationCoordinator {
    config: CoordinatorConfig,
    devices: Mutex<Option<EngineDevices>>,
    activity: ActivityTracker,
    intake: SharedIntake,
    contacts: ContactDirectory,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    events_tx: broadcast::Sender<SentinelEvent>,
    level: Arc<Mutex<EscalationLevel>>,
    statuses: Arc<Mutex<StatusBoard>>,
    seq: Arc<AtomicU64>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl EscalationCoordinator {
    /// Create a coordinator. Nothing runs until `start()`.
    pub fn new(
        config: CoordinatorConfig,
        devices: EngineDevices,
        intake: SharedIntake,
        contacts: ContactDirectory,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            devices: Mutex::new(Some(devices)),
            activity: ActivityTracker::new(),
            intake,
            contacts,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            events_tx,
            level: Arc::new(Mutex::new(EscalationLevel::Idle)),
            statuses: Arc::new(Mutex::new(StatusBoard::default())),
            seq: Arc::new(AtomicU64::new(0)),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the run loop on the current tokio runtime.
    ///
    /// # Errors
    /// `SentinelError::AlreadyRunning` on a second call.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SentinelError::AlreadyRunning);
        }
        let cmd_rx = self
            .cmd_rx
            .lock()
            .take()
            .ok_or(SentinelError::AlreadyRunning)?;
        let devices = self
            .devices
            .lock()
            .take()
            .ok_or(SentinelError::AlreadyRunning)?;

        let ctx = run::RunContext {
            config: self.config.clone(),
            devices,
            activity: self.activity.clone(),
            intake: Arc::clone(&self.intake),
            contacts: self.contacts.clone(),
            cmd_tx: self.cmd_tx.clone(),
            cmd_rx,
            events_tx: self.events_tx.clone(),
            level: Arc::clone(&self.level),
            statuses: Arc::clone(&self.statuses),
            seq: Arc::clone(&self.seq),
            shutdown: self.shutdown.clone(),
        };

        tokio::spawn(run::run(ctx));
        info!("escalation coordinator started");
        Ok(())
    }

    /// Request the run loop to exit and tear down any active sessions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Cloneable input surface for host event handlers.
    pub fn handle(&self) -> EscalationHandle {
        EscalationHandle {
            cmd_tx: self.cmd_tx.clone(),
            activity: self.activity.clone(),
            level: Arc::clone(&self.level),
            statuses: Arc::clone(&self.statuses),
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<SentinelEvent> {
        self.events_tx.subscribe()
    }

    /// Current escalation level (snapshot).
    pub fn level(&self) -> EscalationLevel {
        *self.level.lock()
    }

    /// Current status board (snapshot).
    pub fn statuses(&self) -> StatusBoard {
        self.statuses.lock().clone()
    }
}

/// Cloneable handle for feeding inputs to a running coordinator.
#[derive(Debug, Clone)]
pub struct EscalationHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    activity: ActivityTracker,
    level: Arc<Mutex<EscalationLevel>>,
    statuses: Arc<Mutex<StatusBoard>>,
}

impl EscalationHandle {
    /// Record a recognized user input event.
    ///
    /// Marks the activity timestamp immediately (so the periodic check sees
    /// it even before the reset is processed) and asks the coordinator to
    /// cancel every armed subsystem and return to `Idle`.
    pub fn record_activity(&self) {
        self.activity.mark();
        let _ = self.cmd_tx.send(Command::Activity);
    }

    /// Escalate immediately, bypassing the threshold ladder.
    pub fn trigger_manual(&self) {
        let _ = self.cmd_tx.send(Command::Manual);
    }

    /// Duration since the last recorded input (display only).
    pub fn elapsed_inactivity(&self) -> Duration {
        self.activity.elapsed()
    }

    /// Current escalation level (snapshot).
    pub fn level(&self) -> EscalationLevel {
        *self.level.lock()
    }

    /// Last known status of one subsystem.
    pub fn status(&self, subsystem: Subsystem) -> SubsystemStatus {
        let board = self.statuses.lock();
        match subsystem {
            Subsystem::Vision => board.vision,
            Subsystem::Dictation => board.dictation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_ladder_contract() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.vision_after, Duration::from_secs(40));
        assert_eq!(config.dictation_after, Duration::from_secs(300));
        assert_eq!(config.silence_countdown, Duration::from_secs(120));
        assert_eq!(config.analyzer.closed_eye_frame_limit, 60);
        assert_eq!(config.analyzer.no_face_frame_limit, 90);
    }

    #[test]
    fn status_board_defaults_to_idle() {
        let board = StatusBoard::default();
        assert_eq!(board.vision, SubsystemStatus::Idle);
        assert_eq!(board.dictation, SubsystemStatus::Idle);
    }
}
