//! Events broadcast by the escalation engine.
//!
//! The engine never renders UI: everything a host needs to display (current
//! escalation level, per-subsystem status strings, captured dictation text,
//! dispatch outcomes) is emitted here as serializable events on a
//! `tokio::sync::broadcast` channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four rungs of the escalation ladder, in order.
///
/// Transitions are monotonic forward on inactivity. Any recognized activity
/// resets to `Idle` from every other level; nothing else ever moves the
/// level backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationLevel {
    /// User active recently; no monitors armed.
    Idle,
    /// Camera-based panic detection running.
    VisionArmed,
    /// Voice dictation fallback running (vision may still be running too).
    DictationArmed,
    /// An emergency dispatch has been triggered. Only activity resets this.
    Escalated,
}

/// Subsystems that report a user-visible status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Vision,
    Dictation,
}

/// Short status of one subsystem, shown verbatim to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemStatus {
    /// Not armed.
    Idle,
    /// Vision session running, frames being analysed.
    Monitoring,
    /// Dictation session running, recognizer listening.
    Enabled,
    /// Session was cancelled by activity or torn down after escalation.
    Paused,
    /// Session aborted: device denied, artifact load failed, engine fault.
    Failed,
    /// The runtime offers no such capability; arming will never succeed.
    Unsupported,
}

impl std::fmt::Display for SubsystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubsystemStatus::Idle => "idle",
            SubsystemStatus::Monitoring => "monitoring",
            SubsystemStatus::Enabled => "enabled",
            SubsystemStatus::Paused => "paused",
            SubsystemStatus::Failed => "failed",
            SubsystemStatus::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// What caused an escalation. Each trigger maps to the reason string sent in
/// the emergency payload and shown to contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationTrigger {
    /// Explicit user action, bypasses the threshold ladder.
    Manual,
    /// Post-dictation countdown elapsed with no activity.
    SilenceAfterPrompt,
    /// Consecutive closed-eye frame threshold crossed.
    EyesClosed,
    /// Consecutive no-face frame threshold crossed.
    FaceLost,
}

impl EscalationTrigger {
    /// Human-readable reason carried in the emergency request.
    pub fn reason(self) -> &'static str {
        match self {
            EscalationTrigger::Manual => "manual emergency trigger",
            EscalationTrigger::SilenceAfterPrompt => "silence after voice prompt",
            EscalationTrigger::EyesClosed => "prolonged eye closure detected on camera",
            EscalationTrigger::FaceLost => "patient not visible on camera",
        }
    }
}

/// Everything the engine tells its host.
///
/// `seq` increases monotonically across all variants so a host can detect
/// missed events after a broadcast lag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SentinelEvent {
    /// The escalation level changed.
    Level {
        seq: u64,
        level: EscalationLevel,
        /// Present when the change was an escalation.
        reason: Option<String>,
    },
    /// A subsystem's status string changed.
    Status {
        seq: u64,
        subsystem: Subsystem,
        status: SubsystemStatus,
        detail: Option<String>,
    },
    /// Dictation captured final speech and appended it to the intake notes.
    Notes { seq: u64, text: String },
    /// An emergency dispatch finished (successfully or not).
    Dispatch {
        seq: u64,
        delivered: bool,
        summary: String,
        at: DateTime<Utc>,
    },
}

impl SentinelEvent {
    pub fn seq(&self) -> u64 {
        match self {
            SentinelEvent::Level { seq, .. }
            | SentinelEvent::Status { seq, .. }
            | SentinelEvent::Notes { seq, .. }
            | SentinelEvent::Dispatch { seq, .. } => *seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_levels_are_ordered() {
        assert!(EscalationLevel::Idle < EscalationLevel::VisionArmed);
        assert!(EscalationLevel::VisionArmed < EscalationLevel::DictationArmed);
        assert!(EscalationLevel::DictationArmed < EscalationLevel::Escalated);
    }

    #[test]
    fn level_event_serializes_with_lowercase_tags() {
        let event = SentinelEvent::Level {
            seq: 4,
            level: EscalationLevel::VisionArmed,
            reason: None,
        };

        let json = serde_json::to_value(&event).expect("serialize level event");
        assert_eq!(json["kind"], "level");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["level"], "visionarmed");
        assert_eq!(json["reason"], serde_json::Value::Null);

        let round_trip: SentinelEvent =
            serde_json::from_value(json).expect("deserialize level event");
        assert_eq!(round_trip.seq(), 4);
    }

    #[test]
    fn status_event_carries_subsystem_and_status_strings() {
        let event = SentinelEvent::Status {
            seq: 9,
            subsystem: Subsystem::Vision,
            status: SubsystemStatus::Monitoring,
            detail: Some("camera open".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["kind"], "status");
        assert_eq!(json["subsystem"], "vision");
        assert_eq!(json["status"], "monitoring");
        assert_eq!(json["detail"], "camera open");
    }

    #[test]
    fn subsystem_status_displays_as_wire_string() {
        assert_eq!(SubsystemStatus::Monitoring.to_string(), "monitoring");
        assert_eq!(SubsystemStatus::Unsupported.to_string(), "unsupported");
        assert_eq!(SubsystemStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn trigger_reasons_match_dispatch_contract() {
        assert_eq!(
            EscalationTrigger::Manual.reason(),
            "manual emergency trigger"
        );
        assert_eq!(
            EscalationTrigger::SilenceAfterPrompt.reason(),
            "silence after voice prompt"
        );
    }

    #[test]
    fn escalation_level_rejects_non_lowercase_values() {
        let invalid = r#""VisionArmed""#;
        let err = serde_json::from_str::<EscalationLevel>(invalid);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
