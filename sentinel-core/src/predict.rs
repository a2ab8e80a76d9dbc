//! Risk prediction client.
//!
//! Risk scoring is an external service; the engine only submits the intake
//! payload and hands the typed report back to the host. Nothing here feeds
//! the escalation ladder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};
use crate::intake::IntakeForm;

/// One bar of the vitals comparison chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDatum {
    pub label: String,
    pub user_value: f64,
    pub recommended: HealthyRange,
    pub population_avg: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthyRange {
    pub low: f64,
    pub high: f64,
}

/// The prediction service's full report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    pub name: String,
    pub risk_category: String,
    pub risk_score: f64,
    pub probability: f64,
    pub classification: i32,
    pub advisory_message: String,
    #[serde(default)]
    pub chart: Vec<ChartDatum>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
}

/// HTTP client for the prediction endpoint. Blocking; call from a worker
/// thread, not the coordinator loop.
pub struct PredictionClient {
    endpoint: String,
}

impl PredictionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/api/predict", base_url.trim_end_matches('/')),
        }
    }

    pub fn predict(&self, form: &IntakeForm) -> Result<PredictionReport> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| SentinelError::Network(e.to_string()))?;

        let response = client
            .post(&self.endpoint)
            .json(form)
            .send()
            .map_err(|e| SentinelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SentinelError::Network(format!(
                "prediction service returned {status}"
            )));
        }

        response
            .json()
            .map_err(|e| SentinelError::Network(format!("malformed prediction response: {e}")))
    }
}
