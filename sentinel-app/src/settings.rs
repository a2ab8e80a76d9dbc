//! Runtime settings (JSON file, overridable through the environment).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sentinel_core::coordinator::CoordinatorConfig;
use sentinel_core::vision::analyzer::AnalyzerConfig;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Base URL of the dispatch/prediction service. `None` keeps emergency
    /// notifications in dry-run mode.
    pub service_base_url: Option<String>,
    pub face_model_url: String,
    pub eye_model_url: String,
    pub emergency_contacts: Vec<String>,
    pub emergency_primary_number: Option<String>,
    pub poll_interval_secs: u64,
    pub vision_after_secs: u64,
    pub dictation_after_secs: u64,
    pub silence_countdown_secs: u64,
    pub closed_eye_frame_limit: u32,
    pub no_face_frame_limit: u32,
    /// Fixed fallback position when the runtime has no geolocation.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            service_base_url: None,
            face_model_url:
                "https://raw.githubusercontent.com/opencv/opencv/master/data/haarcascades/haarcascade_frontalface_default.xml"
                    .into(),
            eye_model_url:
                "https://raw.githubusercontent.com/opencv/opencv/master/data/haarcascades/haarcascade_eye.xml"
                    .into(),
            emergency_contacts: Vec::new(),
            emergency_primary_number: None,
            poll_interval_secs: 15,
            vision_after_secs: 40,
            dictation_after_secs: 5 * 60,
            silence_countdown_secs: 2 * 60,
            closed_eye_frame_limit: 60,
            no_face_frame_limit: 90,
            latitude: None,
            longitude: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.poll_interval_secs = self.poll_interval_secs.clamp(1, 300);
        self.vision_after_secs = self.vision_after_secs.clamp(5, 3600);
        self.dictation_after_secs = self
            .dictation_after_secs
            .clamp(self.vision_after_secs, 24 * 3600);
        self.silence_countdown_secs = self.silence_countdown_secs.clamp(5, 3600);
        self.closed_eye_frame_limit = self.closed_eye_frame_limit.max(1);
        self.no_face_frame_limit = self.no_face_frame_limit.max(1);
        self.service_base_url = self
            .service_base_url
            .as_ref()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self.emergency_primary_number = self
            .emergency_primary_number
            .as_ref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.emergency_contacts = self
            .emergency_contacts
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }

    /// Environment variables win over the settings file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SENTINEL_SERVICE_URL") {
            self.service_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("SENTINEL_FACE_MODEL_URL") {
            self.face_model_url = url;
        }
        if let Ok(url) = std::env::var("SENTINEL_EYE_MODEL_URL") {
            self.eye_model_url = url;
        }
        if let Ok(raw) = std::env::var("EMERGENCY_CONTACTS") {
            self.emergency_contacts = parse_list(&raw);
        }
        if let Ok(number) = std::env::var("EMERGENCY_PRIMARY_NUMBER") {
            self.emergency_primary_number = Some(number);
        }
        self.normalize();
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            vision_after: Duration::from_secs(self.vision_after_secs),
            dictation_after: Duration::from_secs(self.dictation_after_secs),
            silence_countdown: Duration::from_secs(self.silence_countdown_secs),
            analyzer: AnalyzerConfig {
                closed_eye_frame_limit: self.closed_eye_frame_limit,
                no_face_frame_limit: self.no_face_frame_limit,
            },
        }
    }
}

/// Comma-separated list, trimmed, blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn default_settings_path() -> PathBuf {
    std::env::var("SENTINEL_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("sentinel-settings.json"))
}

/// Read settings from `path`, falling back to defaults on a missing or
/// malformed file.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = ?path, error = %e, "malformed settings file — using defaults");
                AppSettings::default()
            }
        },
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}
