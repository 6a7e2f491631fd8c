// ── Onboarding progress types ──

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Pipeline stage named by a progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum OnboardingStage {
    Upload,
    Device,
    Assignment,
    Rules,
    Maintenance,
    Safety,
    Complete,
    Error,
    /// Any stage name this client does not know, kept verbatim.
    Other(String),
}

impl OnboardingStage {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upload" => Self::Upload,
            "device" => Self::Device,
            "assignment" => Self::Assignment,
            "rules" => Self::Rules,
            "maintenance" => Self::Maintenance,
            "safety" => Self::Safety,
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => Self::Other(raw.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Upload => "upload",
            Self::Device => "device",
            Self::Assignment => "assignment",
            Self::Rules => "rules",
            Self::Maintenance => "maintenance",
            Self::Safety => "safety",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for OnboardingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OnboardingStage> for String {
    fn from(stage: OnboardingStage) -> Self {
        stage.as_str().to_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Unknown,
}

/// Position within the multi-step pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDetails {
    pub current_step: u32,
    pub total_steps: u32,
    pub step_name: String,
    pub status: StepStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
}

/// One `progress` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: OnboardingStage,
    /// Clamped to `0.0..=100.0`.
    pub progress_percent: f64,
    pub message: String,
    pub sub_message: Option<String>,
    pub step_details: Option<StepDetails>,
    pub error: Option<String>,
    pub retryable: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

/// What the document pipeline produced alongside the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfSummary {
    pub pdf_name: Option<String>,
    pub original_file_name: Option<String>,
    pub file_size: Option<u64>,
    pub document_type: Option<String>,
    pub rules_generated: u32,
    pub maintenance_items: u32,
    pub safety_precautions: u32,
    pub processing_time: Option<u64>,
}

/// Terminal outcome of an onboarding request, whichever path produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnboardingResult {
    pub device_id: String,
    pub device_name: String,
    pub pdf: Option<PdfSummary>,
    /// Response exactly as received.
    pub raw: Value,
}
