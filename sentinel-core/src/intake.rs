//! The patient intake form.
//!
//! The engine does not persist or validate medical data; it holds the
//! latest form state so an escalation can snapshot current vitals, and so
//! dictation has a notes field to append captured speech to. The wire
//! format (snake_case fields, string-valued enums) matches what the
//! prediction and dispatch services expect.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChestPainType {
    #[serde(rename = "typical_angina")]
    TypicalAngina,
    #[serde(rename = "atypical_angina")]
    AtypicalAngina,
    #[serde(rename = "non_anginal")]
    NonAnginal,
    #[serde(rename = "asymptomatic")]
    Asymptomatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestingEcg {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "st_t_abnormality")]
    StTAbnormality,
    #[serde(rename = "left_ventricular_hypertrophy")]
    LeftVentricularHypertrophy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StSlope {
    Upsloping,
    Flat,
    Downsloping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Thalassemia {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "fixed_defect")]
    FixedDefect,
    #[serde(rename = "reversible_defect")]
    ReversibleDefect,
}

/// The complete intake payload, as submitted to the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeForm {
    pub name: String,
    pub age: u32,
    pub sex: Sex,
    pub chest_pain_type: ChestPainType,
    pub bp_systolic: f64,
    pub bp_diastolic: f64,
    pub cholesterol: f64,
    pub sugar_level: f64,
    pub calories_burned: f64,
    pub max_heart_rate: f64,
    pub resting_ecg: RestingEcg,
    pub exercise_angina: bool,
    pub st_depression: f64,
    pub slope: StSlope,
    pub num_major_vessels: u8,
    pub thalassemia: Thalassemia,
    #[serde(default = "default_fasting_hours")]
    pub fasting_hours: f64,
    #[serde(default)]
    pub smoker: bool,
    #[serde(default)]
    pub diabetic: bool,
    #[serde(default)]
    pub emergency_contacts: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_fasting_hours() -> f64 {
    8.0
}

/// The vitals summary embedded in an emergency payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    /// Systolic/diastolic, e.g. `"128/84"`.
    pub bp: String,
    pub cholesterol: String,
    pub sugar: String,
    pub hr: String,
    pub name: String,
}

impl IntakeForm {
    /// Snapshot the vitals fields for an emergency payload. Values are
    /// stringified because the dispatch service folds them verbatim into
    /// SMS bodies.
    pub fn vitals_snapshot(&self) -> VitalsSnapshot {
        VitalsSnapshot {
            bp: format!("{:.0}/{:.0}", self.bp_systolic, self.bp_diastolic),
            cholesterol: format!("{:.0}", self.cholesterol),
            sugar: format!("{:.0}", self.sugar_level),
            hr: format!("{:.0}", self.max_heart_rate),
            name: self.name.clone(),
        }
    }

    /// Append dictation-captured text to the free-text notes field.
    pub fn append_notes(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        match &mut self.notes {
            Some(existing) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(trimmed);
            }
            _ => self.notes = Some(trimmed.to_string()),
        }
    }
}

impl Default for IntakeForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            age: 0,
            sex: Sex::Female,
            chest_pain_type: ChestPainType::Asymptomatic,
            bp_systolic: 0.0,
            bp_diastolic: 0.0,
            cholesterol: 0.0,
            sugar_level: 0.0,
            calories_burned: 0.0,
            max_heart_rate: 0.0,
            resting_ecg: RestingEcg::Normal,
            exercise_angina: false,
            st_depression: 0.0,
            slope: StSlope::Flat,
            num_major_vessels: 0,
            thalassemia: Thalassemia::Normal,
            fasting_hours: default_fasting_hours(),
            smoker: false,
            diabetic: false,
            emergency_contacts: Vec::new(),
            notes: None,
        }
    }
}

/// Shared, mutable intake state. The host writes form updates; dictation
/// appends notes; escalation reads a snapshot.
pub type SharedIntake = Arc<Mutex<IntakeForm>>;

pub fn shared(form: IntakeForm) -> SharedIntake {
    Arc::new(Mutex::new(form))
}
