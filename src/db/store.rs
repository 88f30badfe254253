use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use anyhow::Result;
use async_trait::async_trait;

use super::Database;

/// String key/value persistence used by the scan controller.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value).await
    }
}

/// Process-local store. Used in tests and when SQLite cannot be opened.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    pub fn snapshot(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.snapshot(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_overwrites() -> Result<()> {
        let store = MemoryStore::with_values([("phishguard_autoscan", "false")]);
        assert_eq!(store.get("phishguard_autoscan").await?.as_deref(), Some("false"));

        store.set("phishguard_autoscan", "true").await?;
        assert_eq!(store.snapshot("phishguard_autoscan").as_deref(), Some("true"));
        assert_eq!(store.get("missing").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn database_implements_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::new(dir.path().join("store.sqlite3"))?;
        let store: &dyn KeyValueStore = &db;

        store.set("phishguard_history", "[]").await?;
        assert_eq!(store.get("phishguard_history").await?.as_deref(), Some("[]"));
        Ok(())
    }
}
