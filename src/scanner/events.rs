use serde::Serialize;

use super::ScanSnapshot;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ScanEvent {
    StateChanged(ScanSnapshot),
    #[serde(rename_all = "camelCase")]
    Progress {
        scan_progress: f64,
        analysis_step: usize,
    },
    HistoryChanged {
        items: usize,
    },
}
