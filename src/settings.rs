use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Timing constants for the scan controller. All values are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerTimings {
    /// Quiet period after the last input change before the countdown starts.
    pub debounce_ms: u64,
    /// Length of the cosmetic countdown that precedes an auto-scan.
    pub countdown_ms: u64,
    /// Cadence for both the countdown and the scan progress estimator.
    pub tick_ms: u64,
    /// Assumed scan duration used by the progress estimator.
    pub estimated_scan_ms: u64,
    /// Pause between a successful response and publishing the result.
    pub completion_delay_ms: u64,
}

impl Default for ScannerTimings {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            countdown_ms: 1_500,
            tick_ms: 100,
            estimated_scan_ms: 4_000,
            completion_delay_ms: 500,
        }
    }
}

impl ScannerTimings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    pub fn tick(&self) -> Duration {
        // interval() panics on a zero period
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn estimated_scan(&self) -> Duration {
        Duration::from_millis(self.estimated_scan_ms.max(1))
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisSettings {
    pub endpoint: String,
    pub model: String,
    /// Never written to disk; filled from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    scanner: ScannerTimings,
    analysis: AnalysisSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`, writing the defaults when the file is absent.
    /// A malformed file falls back to defaults without being overwritten.
    pub fn new(path: PathBuf) -> Result<Self> {
        let exists = path.exists();
        let mut data: UserSettings = if exists {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!(
                    "Ignoring malformed settings file {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        data.analysis.api_key = api_key_from_env();

        let store = Self {
            path,
            data: RwLock::new(data),
        };

        if !exists {
            store.persist(&store.data.read().unwrap_or_else(PoisonError::into_inner))?;
        }

        Ok(store)
    }

    pub fn scanner_timings(&self) -> ScannerTimings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .scanner
            .clone()
    }

    pub fn analysis(&self) -> AnalysisSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .analysis
            .clone()
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn api_key_from_env() -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_writes_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone())?;
        assert_eq!(store.scanner_timings(), ScannerTimings::default());
        assert!(path.exists());

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(written["scanner"]["debounce_ms"], 1_000);
        assert!(written["analysis"].get("api_key").is_none());
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"scanner": {"countdown_ms": 3000}}"#)?;

        let timings = SettingsStore::new(path)?.scanner_timings();
        assert_eq!(timings.countdown(), Duration::from_millis(3_000));
        assert_eq!(timings.debounce(), Duration::from_millis(1_000));
        Ok(())
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json")?;

        let store = SettingsStore::new(path.clone())?;
        assert_eq!(store.analysis().model, AnalysisSettings::default().model);
        assert_eq!(fs::read_to_string(&path)?, "{not json");
        Ok(())
    }

    #[test]
    fn zero_tick_is_clamped() {
        let timings = ScannerTimings {
            tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(timings.tick(), Duration::from_millis(1));
    }
}
