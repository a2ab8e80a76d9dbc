//! Emergency dispatch client.
//!
//! The dispatch service owns delivery (SMS fan-out, voice calls, dry-run
//! mode when it has no telephony credentials). The engine's contract is
//! narrower: send one request per escalation event, report the outcome,
//! never retry on its own.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{Result, SentinelError};
use crate::intake::VitalsSnapshot;

/// The escalation payload, assembled at the moment of escalation so it
/// reflects the latest known vitals, location and contacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyRequest {
    pub reason: String,
    pub vitals: VitalsSnapshot,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub contacts: Vec<String>,
}

/// What the dispatch service did with a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyOutcome {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub sms_dispatched: Vec<String>,
    #[serde(default)]
    pub calls_triggered: Vec<String>,
}

impl EmergencyOutcome {
    /// Short human-readable summary: mode plus notification counts.
    pub fn summary(&self) -> String {
        let mode = if self.dry_run { "dry-run" } else { "live" };
        format!(
            "{}: {} SMS, {} calls",
            mode,
            self.sms_dispatched.len(),
            self.calls_triggered.len()
        )
    }
}

/// Seam for the outbound dispatch call.
///
/// Implementations may block; the coordinator only ever invokes this from a
/// `spawn_blocking` thread.
pub trait EmergencyDispatch: Send + Sync + 'static {
    fn dispatch(&self, request: &EmergencyRequest) -> Result<EmergencyOutcome>;
}

/// Shared dispatcher handle.
pub type DispatchHandle = Arc<dyn EmergencyDispatch>;

/// HTTP client for the dispatch service's notify endpoint.
pub struct HttpDispatcher {
    endpoint: String,
}

impl HttpDispatcher {
    /// `base_url` is the service root, e.g. `http://localhost:8000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/api/emergency/notify", base_url.trim_end_matches('/')),
        }
    }
}

impl EmergencyDispatch for HttpDispatcher {
    fn dispatch(&self, request: &EmergencyRequest) -> Result<EmergencyOutcome> {
        // Client construction is deferred to the call so this type can be
        // created while an async runtime is entered; dispatch itself always
        // runs on a blocking thread.
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| SentinelError::Network(e.to_string()))?;

        let response = client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|e| SentinelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SentinelError::Network(format!(
                "dispatch service returned {status}"
            )));
        }

        let outcome: EmergencyOutcome = response
            .json()
            .map_err(|e| SentinelError::Network(format!("malformed dispatch response: {e}")))?;

        info!(
            reason = %request.reason,
            recipients = request.contacts.len(),
            summary = %outcome.summary(),
            "emergency dispatch completed"
        );
        Ok(outcome)
    }
}

/// Dispatcher used when no dispatch service is configured.
///
/// Mirrors the service's own dry-run behaviour: every resolved recipient is
/// reported as notified, nothing leaves the machine. Requests are recorded
/// so hosts (and tests) can inspect what would have been sent.
#[derive(Default)]
pub struct DryRunDispatcher {
    requests: Arc<Mutex<Vec<EmergencyRequest>>>,
}

impl DryRunDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request dispatched so far, oldest first.
    pub fn requests(&self) -> Arc<Mutex<Vec<EmergencyRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl EmergencyDispatch for DryRunDispatcher {
    fn dispatch(&self, request: &EmergencyRequest) -> Result<EmergencyOutcome> {
        info!(
            reason = %request.reason,
            recipients = request.contacts.len(),
            "dry-run dispatch — no notifications sent"
        );
        self.requests.lock().push(request.clone());
        Ok(EmergencyOutcome {
            dry_run: true,
            sms_dispatched: request.contacts.clone(),
            calls_triggered: request.contacts.clone(),
        })
    }
}
