//! Administrator-managed settings kept in the store: the source list, the
//! chunk size and the output encoding. Validation happens here, so the
//! pipeline always receives a usable chunk size.

use crate::store::{KvStore, StoreError, keys};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(400).unwrap();
pub const CHUNK_SIZE_RANGE: RangeInclusive<usize> = 50..=2000;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chunk size {0} is outside the accepted range 50..=2000")]
    ChunkSizeOutOfRange(usize),

    #[error("source descriptor is empty")]
    EmptySource,
}

#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn KvStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Settings { store }
    }

    /// Configured source descriptors. Entries that are blank or not strings
    /// are skipped. A stored value that is not a JSON array reads as empty.
    pub async fn sources(&self) -> Result<Vec<String>, SettingsError> {
        let Some(raw) = self.store.get(keys::SOURCES).await? else {
            return Ok(Vec::new());
        };

        let entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                tracing::warn!("stored sources are not a list, ignoring them");
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored sources are not valid JSON, ignoring them");
                return Ok(Vec::new());
            }
        };

        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Adds a descriptor unless it is already present. Returns whether the
    /// list changed.
    pub async fn add_source(&self, source: &str) -> Result<bool, SettingsError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(SettingsError::EmptySource);
        }

        let mut sources = self.sources().await?;
        if sources.iter().any(|s| s == source) {
            return Ok(false);
        }

        sources.push(source.to_string());
        self.store.put_json(keys::SOURCES, &sources).await?;
        Ok(true)
    }

    /// Removes every occurrence of a descriptor. Returns whether the list
    /// changed.
    pub async fn remove_source(&self, source: &str) -> Result<bool, SettingsError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(SettingsError::EmptySource);
        }

        let mut sources = self.sources().await?;
        let before = sources.len();
        sources.retain(|s| s != source);

        if sources.len() == before {
            return Ok(false);
        }

        self.store.put_json(keys::SOURCES, &sources).await?;
        Ok(true)
    }

    /// Stored chunk size, or the default when missing or unusable.
    pub async fn chunk_size(&self) -> Result<NonZeroUsize, SettingsError> {
        let stored = self
            .store
            .get(keys::CHUNK_SIZE)
            .await?
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .and_then(NonZeroUsize::new);

        Ok(stored.unwrap_or(DEFAULT_CHUNK_SIZE))
    }

    pub async fn set_chunk_size(&self, chunk_size: usize) -> Result<(), SettingsError> {
        if !CHUNK_SIZE_RANGE.contains(&chunk_size) {
            return Err(SettingsError::ChunkSizeOutOfRange(chunk_size));
        }

        self.store
            .put(keys::CHUNK_SIZE, &chunk_size.to_string())
            .await?;
        Ok(())
    }

    pub async fn base64_encode(&self) -> Result<bool, SettingsError> {
        Ok(self.store.get(keys::BASE64_ENCODE).await?.as_deref() == Some("1"))
    }

    pub async fn set_base64_encode(&self, enabled: bool) -> Result<(), SettingsError> {
        self.store
            .put(keys::BASE64_ENCODE, if enabled { "1" } else { "0" })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn settings() -> (Arc<dyn KvStore>, Settings) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        (store.clone(), Settings::new(store))
    }

    #[tokio::test]
    async fn test_sources() {
        let (_store, settings) = settings();
        assert!(settings.sources().await.unwrap().is_empty());

        assert!(settings.add_source(" https://a.test/sub ").await.unwrap());
        assert!(!settings.add_source("https://a.test/sub").await.unwrap());
        assert!(settings.add_source("inline:vless://u@h.test:443").await.unwrap());
        assert!(matches!(
            settings.add_source("   ").await,
            Err(SettingsError::EmptySource)
        ));

        assert_eq!(
            settings.sources().await.unwrap(),
            vec!["https://a.test/sub", "inline:vless://u@h.test:443"]
        );

        assert!(settings.remove_source("https://a.test/sub").await.unwrap());
        assert!(!settings.remove_source("https://a.test/sub").await.unwrap());
        assert_eq!(settings.sources().await.unwrap(), vec!["inline:vless://u@h.test:443"]);
    }

    #[tokio::test]
    async fn test_blank_sources_skipped() {
        let (store, settings) = settings();
        store
            .put(keys::SOURCES, r#"["", "  ", "inline:x"]"#)
            .await
            .unwrap();
        assert_eq!(settings.sources().await.unwrap(), vec!["inline:x"]);
    }

    #[tokio::test]
    async fn test_non_string_sources_skipped() {
        let (store, settings) = settings();
        store
            .put(keys::SOURCES, r#"["inline:trojan://pw@h.test:443", 42, null, {"url": "x"}]"#)
            .await
            .unwrap();
        assert_eq!(
            settings.sources().await.unwrap(),
            vec!["inline:trojan://pw@h.test:443"]
        );

        store.put(keys::SOURCES, r#"{"a": 1}"#).await.unwrap();
        assert!(settings.sources().await.unwrap().is_empty());

        store.put(keys::SOURCES, "not json").await.unwrap();
        assert!(settings.sources().await.unwrap().is_empty());

        // a corrupt list is replaced on the next edit
        assert!(settings.add_source("inline:x").await.unwrap());
        assert_eq!(settings.sources().await.unwrap(), vec!["inline:x"]);
    }

    #[tokio::test]
    async fn test_chunk_size() {
        let (store, settings) = settings();
        assert_eq!(settings.chunk_size().await.unwrap().get(), 400);

        settings.set_chunk_size(50).await.unwrap();
        assert_eq!(settings.chunk_size().await.unwrap().get(), 50);
        settings.set_chunk_size(2000).await.unwrap();
        assert_eq!(settings.chunk_size().await.unwrap().get(), 2000);

        assert!(matches!(
            settings.set_chunk_size(49).await,
            Err(SettingsError::ChunkSizeOutOfRange(49))
        ));
        assert!(matches!(
            settings.set_chunk_size(2001).await,
            Err(SettingsError::ChunkSizeOutOfRange(2001))
        ));
        assert_eq!(settings.chunk_size().await.unwrap().get(), 2000);

        store.put(keys::CHUNK_SIZE, "0").await.unwrap();
        assert_eq!(settings.chunk_size().await.unwrap().get(), 400);
        store.put(keys::CHUNK_SIZE, "abc").await.unwrap();
        assert_eq!(settings.chunk_size().await.unwrap().get(), 400);
    }

    #[tokio::test]
    async fn test_base64_flag() {
        let (_store, settings) = settings();
        assert!(!settings.base64_encode().await.unwrap());

        settings.set_base64_encode(true).await.unwrap();
        assert!(settings.base64_encode().await.unwrap());

        settings.set_base64_encode(false).await.unwrap();
        assert!(!settings.base64_encode().await.unwrap());
    }
}
