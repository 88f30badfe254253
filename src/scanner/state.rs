use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::{AnalysisResult, ScanHistory};

/// Named phases shown while a scan is running; the progress estimator maps
/// its percentage onto this list.
pub const ANALYSIS_STEPS: [&str; 5] = [
    "Establishing Secure Handshake",
    "Fetching Global Reputation Data",
    "Running Visual Heuristic Engine",
    "Analyzing Adversarial Patterns",
    "Generating Threat Verdict",
];

pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", content = "detail", rename_all = "camelCase")]
pub enum ScanState {
    Idle,
    Scanning,
    Resulted(AnalysisResult),
    Failed(String),
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState::Idle
    }
}

impl ScanState {
    pub fn is_scanning(&self) -> bool {
        matches!(self, ScanState::Scanning)
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            ScanState::Resulted(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ScanState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AutoScanStatus {
    Idle,
    Typing,
    Waiting,
    Analyzing,
}

impl Default for AutoScanStatus {
    fn default() -> Self {
        AutoScanStatus::Idle
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InputMode {
    Url,
    Message,
}

impl InputMode {
    pub fn detect(text: &str) -> Self {
        let lowered = text.trim_start().to_ascii_lowercase();
        if lowered.starts_with("http") || lowered.starts_with("www") {
            InputMode::Url
        } else {
            InputMode::Message
        }
    }
}

/// Point-in-time view of the controller, published with every state change.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub scan: ScanState,
    pub auto_scan_status: AutoScanStatus,
    pub auto_scan_enabled: bool,
    pub scan_progress: f64,
    pub analysis_step: usize,
    pub analysis_step_label: &'static str,
    pub input_text: String,
    pub has_image: bool,
    pub input_mode: InputMode,
    pub history_len: usize,
}

/// The pending debounce/countdown task for one auto-scan cycle.
#[derive(Debug)]
pub(crate) struct AutoScanCycle {
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub(crate) struct ScannerState {
    pub scan: ScanState,
    pub auto_status: AutoScanStatus,
    pub progress: f64,
    pub analysis_step: usize,
    pub input_text: String,
    pub image: Option<String>,
    pub auto_scan_enabled: bool,
    pub history: ScanHistory,
    /// Set while the analysis service call is outstanding. Outlives the
    /// Scanning phase when the attempt is detached by clear/restore.
    pub in_flight: bool,
    /// Bumped per scan attempt and whenever an attempt is detached.
    pub scan_generation: u64,
    /// Bumped whenever the auto-scan cycle is cancelled or restarted.
    pub cycle_generation: u64,
    pub estimator: Option<JoinHandle<()>>,
    pub auto_cycle: Option<AutoScanCycle>,
    /// Bumped per change of the persisted values, so store writes issued
    /// outside the lock can drop a stale value.
    pub history_version: u64,
    pub auto_scan_version: u64,
}

impl ScannerState {
    pub fn new(history: ScanHistory, auto_scan_enabled: bool) -> Self {
        Self {
            history,
            auto_scan_enabled,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            scan: self.scan.clone(),
            auto_scan_status: self.auto_status,
            auto_scan_enabled: self.auto_scan_enabled,
            scan_progress: self.progress,
            analysis_step: self.analysis_step,
            analysis_step_label: ANALYSIS_STEPS[self.analysis_step.min(ANALYSIS_STEPS.len() - 1)],
            input_text: self.input_text.clone(),
            has_image: self.image.is_some(),
            input_mode: InputMode::detect(&self.input_text),
            history_len: self.history.len(),
        }
    }

    /// Starts a new attempt and returns its generation.
    pub fn begin_scan(&mut self) -> u64 {
        self.scan_generation = self.scan_generation.wrapping_add(1);
        self.in_flight = true;
        self.scan = ScanState::Scanning;
        self.auto_status = AutoScanStatus::Analyzing;
        self.progress = 0.0;
        self.analysis_step = 0;
        self.scan_generation
    }

    pub fn is_current_scan(&self, generation: u64) -> bool {
        self.scan_generation == generation
    }

    /// Leaves the attempt running but stops it from touching visible state.
    pub fn detach_scan(&mut self) {
        self.stop_estimator();
        self.scan_generation = self.scan_generation.wrapping_add(1);
        if self.auto_status == AutoScanStatus::Analyzing {
            self.auto_status = AutoScanStatus::Idle;
        }
        self.progress = 0.0;
        self.analysis_step = 0;
    }

    pub fn stop_estimator(&mut self) {
        if let Some(handle) = self.estimator.take() {
            handle.abort();
        }
    }

    pub fn cancel_auto_cycle(&mut self) {
        self.cycle_generation = self.cycle_generation.wrapping_add(1);
        if let Some(cycle) = self.auto_cycle.take() {
            cycle.token.cancel();
            cycle.handle.abort();
        }
    }

    /// Status to fall back to when no auto-scan cycle is pending.
    pub fn settle_auto_status(&mut self) {
        if self.scan_owns_progress() {
            self.auto_status = AutoScanStatus::Analyzing;
        } else {
            self.auto_status = AutoScanStatus::Idle;
            self.progress = 0.0;
        }
    }

    /// Whether the progress bar currently belongs to a visible scan attempt
    /// rather than the auto-scan countdown.
    pub fn scan_owns_progress(&self) -> bool {
        self.in_flight && self.scan.is_scanning()
    }

    pub fn auto_scan_armed(&self) -> bool {
        self.auto_scan_enabled && !self.input_text.trim().is_empty()
    }
}

pub fn estimate_progress(elapsed_ms: u128, estimated_ms: u128) -> f64 {
    let ratio = elapsed_ms as f64 / estimated_ms.max(1) as f64;
    (ratio * 95.0).round().min(95.0)
}

pub fn step_for_progress(progress: f64) -> usize {
    let index = (progress / 100.0 * ANALYSIS_STEPS.len() as f64).floor() as usize;
    index.min(ANALYSIS_STEPS.len() - 1)
}

pub fn countdown_progress(elapsed_ms: u128, countdown_ms: u128) -> f64 {
    if countdown_ms == 0 {
        return 100.0;
    }
    (elapsed_ms as f64 / countdown_ms as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimator_caps_at_ninety_five() {
        assert_eq!(estimate_progress(0, 4_000), 0.0);
        assert_eq!(estimate_progress(1_000, 4_000), 24.0);
        assert_eq!(estimate_progress(4_000, 4_000), 95.0);
        assert_eq!(estimate_progress(60_000, 4_000), 95.0);
    }

    #[test]
    fn steps_follow_progress() {
        assert_eq!(step_for_progress(0.0), 0);
        assert_eq!(step_for_progress(24.0), 1);
        assert_eq!(step_for_progress(95.0), 4);
        assert_eq!(step_for_progress(100.0), ANALYSIS_STEPS.len() - 1);
    }

    #[test]
    fn countdown_is_linear() {
        assert_eq!(countdown_progress(300, 1_500), 20.0);
        assert_eq!(countdown_progress(3_000, 1_500), 100.0);
        assert_eq!(countdown_progress(5, 0), 100.0);
    }

    #[test]
    fn input_mode_detects_urls() {
        assert_eq!(InputMode::detect("HTTPS://login.example.com"), InputMode::Url);
        assert_eq!(InputMode::detect("  www.example.com"), InputMode::Url);
        assert_eq!(InputMode::detect("Dear customer, verify"), InputMode::Message);
    }

    #[test]
    fn scan_state_serializes_with_phase_tag() {
        let value = serde_json::to_value(ScanState::Failed("boom".into())).unwrap();
        assert_eq!(value["phase"], "failed");
        assert_eq!(value["detail"], "boom");
        assert_eq!(serde_json::to_value(ScanState::Idle).unwrap()["phase"], "idle");
    }

    #[test]
    fn begin_scan_advances_generation() {
        let mut state = ScannerState::default();
        let first = state.begin_scan();
        let second = state.begin_scan();
        assert_eq!(second, first + 1);
        assert!(state.is_current_scan(second));
        assert_eq!(state.auto_status, AutoScanStatus::Analyzing);
    }
}
