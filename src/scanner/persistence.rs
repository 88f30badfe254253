//! Mirrors the controller's durable state (history and the auto-scan flag)
//! into a [`KeyValueStore`]. Store failures are logged and swallowed so the
//! controller keeps working in memory.

use crate::db::KeyValueStore;
use crate::models::{HistoryItem, ScanHistory};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const HISTORY_KEY: &str = "phishguard_history";
pub const AUTO_SCAN_KEY: &str = "phishguard_autoscan";

pub async fn load_history(store: &dyn KeyValueStore) -> ScanHistory {
    match store.get(HISTORY_KEY).await {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<HistoryItem>>(&raw) {
            Ok(items) => ScanHistory::from_items(items),
            Err(err) => {
                log_warn!("Discarding unreadable scan history: {err}");
                ScanHistory::new()
            }
        },
        Ok(None) => ScanHistory::new(),
        Err(err) => {
            log_warn!("Failed to load scan history, starting empty: {err:#}");
            ScanHistory::new()
        }
    }
}

pub async fn load_auto_scan(store: &dyn KeyValueStore) -> bool {
    match store.get(AUTO_SCAN_KEY).await {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            log_warn!("Ignoring unreadable auto-scan flag {raw:?}: {err}");
            false
        }),
        Ok(None) => false,
        Err(err) => {
            log_warn!("Failed to load auto-scan flag, defaulting to off: {err:#}");
            false
        }
    }
}

pub async fn save_history(store: &dyn KeyValueStore, serialized: &str) {
    if let Err(err) = store.set(HISTORY_KEY, serialized).await {
        log_warn!("Failed to persist scan history: {err:#}");
    }
}

pub async fn save_auto_scan(store: &dyn KeyValueStore, enabled: bool) {
    let value = if enabled { "true" } else { "false" };
    if let Err(err) = store.set(AUTO_SCAN_KEY, value).await {
        log_warn!("Failed to persist auto-scan flag: {err:#}");
    }
}

pub fn serialize_history(history: &ScanHistory) -> Option<String> {
    match serde_json::to_string(history) {
        Ok(json) => Some(json),
        Err(err) => {
            log_warn!("Failed to serialize scan history: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn missing_keys_use_defaults() {
        let store = MemoryStore::new();
        assert!(load_history(&store).await.is_empty());
        assert!(!load_auto_scan(&store).await);
    }

    #[tokio::test]
    async fn malformed_values_use_defaults() {
        let store = MemoryStore::with_values([(HISTORY_KEY, "{oops"), (AUTO_SCAN_KEY, "\"yes\"")]);
        assert!(load_history(&store).await.is_empty());
        assert!(!load_auto_scan(&store).await);
    }

    #[tokio::test]
    async fn flag_round_trips() {
        let store = MemoryStore::new();
        save_auto_scan(&store, true).await;
        assert_eq!(store.snapshot(AUTO_SCAN_KEY).as_deref(), Some("true"));
        assert!(load_auto_scan(&store).await);
    }
}
