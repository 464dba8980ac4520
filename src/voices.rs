//! Voice gallery catalog.
//!
//! A flat JSON array of voice records on disk. Reads go to the file every time
//! so that records added by hand (preloaded voices) show up without a restart;
//! writes are serialized by a mutex and replace the file in one rename.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

pub const KIND_PRELOADED: &str = "preloaded";
pub const KIND_USER: &str = "user";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceRecord {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// File name inside the voices directory.
    pub filename: String,

    /// Reference clip length in seconds.
    #[serde(default)]
    pub duration: f64,

    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub created_at: String,

    /// Fields this service does not interpret, kept as found.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_language() -> String {
    "es".to_string()
}

fn default_kind() -> String {
    KIND_USER.to_string()
}

impl VoiceRecord {
    pub fn is_preloaded(&self) -> bool {
        self.kind == KIND_PRELOADED
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog {path} is not a valid voice list: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct VoiceCatalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl VoiceCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records. A missing file is an empty catalog.
    pub async fn list(&self) -> Result<Vec<VoiceRecord>, CatalogError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CatalogError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&contents).map_err(|source| CatalogError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<VoiceRecord>, CatalogError> {
        Ok(self.list().await?.into_iter().find(|v| v.id == id))
    }

    pub async fn insert(&self, record: VoiceRecord) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;
        let mut voices = self.list().await?;
        voices.push(record);
        self.save(&voices).await
    }

    /// Remove and return the record with `id`, if any.
    pub async fn remove(&self, id: &str) -> Result<Option<VoiceRecord>, CatalogError> {
        let _guard = self.write_lock.lock().await;
        let mut voices = self.list().await?;
        let Some(index) = voices.iter().position(|v| v.id == id) else {
            return Ok(None);
        };
        let removed = voices.remove(index);
        self.save(&voices).await?;
        Ok(Some(removed))
    }

    async fn save(&self, voices: &[VoiceRecord]) -> Result<(), CatalogError> {
        let io_err = |source| CatalogError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(voices).map_err(|source| CatalogError::Parse {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }
}
