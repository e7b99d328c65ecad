// src/storage.rs
//! Local UI preferences: a flat JSON object of string keys and values.

use crate::error::StorageError;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_PAIR: &str = "pair";

#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl PreferenceStore {
    /// Reads the file at `path`; a missing file is an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No preferences at {}, starting fresh", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    /// Like `load`, but a malformed file is logged and ignored.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path).await {
            Ok(store) => store,
            Err(e) => {
                warn!("Ignoring preferences {}: {}", path.display(), e);
                Self {
                    path: path.to_path_buf(),
                    values: BTreeMap::new(),
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub async fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.get(key) == Some(value) {
            return Ok(());
        }
        self.values.insert(key.to_string(), value.to_string());
        let data = serde_json::to_string_pretty(&self.values)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("auction-terminal-{}", uuid::Uuid::new_v4()))
            .join("prefs.json")
    }

    #[tokio::test]
    async fn values_survive_a_reload() {
        let path = temp_path();
        let mut store = PreferenceStore::load(&path).await.unwrap();
        assert_eq!(store.get(KEY_LANGUAGE), None);
        store.set(KEY_LANGUAGE, "de").await.unwrap();
        store.set(KEY_PAIR, "BTC/USDC").await.unwrap();

        let reloaded = PreferenceStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get(KEY_LANGUAGE), Some("de"));
        assert_eq!(reloaded.get(KEY_PAIR), Some("BTC/USDC"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error_but_can_be_ignored() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PreferenceStore::load(&path).await,
            Err(StorageError::Malformed(_))
        ));
        let store = PreferenceStore::load_or_default(&path).await;
        assert_eq!(store.get(KEY_ENDPOINT), None);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
