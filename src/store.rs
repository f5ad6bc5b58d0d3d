//! Resumable workflow state behind an async key-value interface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::analyze::TimedLine;
use crate::error::Result;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
    /// Remove every key.
    async fn clear(&self) -> Result<()>;
}

/// Store keeping one file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sanitized key plus a hash of the raw key, so `a/b` and `a_b` stay apart.
    fn file_name(key: &str) -> String {
        let readable: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{readable}-{:08x}", fnv1a(key.as_bytes()) as u32)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(Self::file_name(key))
    }
}

#[async_trait]
impl StateStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(key);
        let staging = self
            .root
            .join(format!("{}.partial", Self::file_name(key)));
        tokio::fs::write(&staging, value).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// Everything needed to pick a narration run back up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub video_path: Option<PathBuf>,
    pub video_duration: Option<f64>,
    /// [`fingerprint`] of the video bytes the session was produced from.
    pub video_fingerprint: Option<String>,
    pub prompt: String,
    pub language: String,
    pub voice_id: Option<String>,
    pub transcript: Option<String>,
    pub timestamps: Vec<TimedLine>,
    /// Whether narration audio has been stored for this session.
    pub has_audio: bool,
    pub merged_output: Option<PathBuf>,
    pub merge_failed: bool,
}

impl SessionState {
    /// Whether a saved state was produced for the same inputs.
    pub fn matches(
        &self,
        video: &Path,
        fingerprint: &str,
        prompt: &str,
        language: &str,
        voice_id: &str,
    ) -> bool {
        self.video_path.as_deref() == Some(video)
            && self.video_fingerprint.as_deref() == Some(fingerprint)
            && self.prompt == prompt
            && self.language == language
            && self.voice_id.as_deref().map_or(true, |v| v == voice_id)
    }
}

/// Typed view over a [`StateStore`] for one input video.
pub struct Session {
    store: Arc<dyn StateStore>,
    prefix: String,
}

impl Session {
    pub fn new(store: Arc<dyn StateStore>, video: &Path) -> Self {
        Self {
            store,
            prefix: session_prefix(video),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}.{}", self.prefix, name)
    }

    /// Saved state, or `None` when there is none or it no longer parses.
    pub async fn load(&self) -> Result<Option<SessionState>> {
        let Some(bytes) = self.store.get(&self.key("state")).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("Ignoring unreadable session {}: {e}", self.prefix);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, state: &SessionState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.store.put(&self.key("state"), &bytes).await?;
        debug!("Saved session {}", self.prefix);
        Ok(())
    }

    pub async fn save_audio(&self, audio: &[u8]) -> Result<()> {
        self.store.put(&self.key("audio"), audio).await
    }

    pub async fn load_audio(&self) -> Result<Option<Vec<u8>>> {
        self.store.get(&self.key("audio")).await
    }

    /// Forget everything stored for this video.
    pub async fn reset(&self) -> Result<()> {
        let keys = [self.key("state"), self.key("audio")];
        try_join_all(keys.iter().map(|k| self.store.delete(k))).await?;
        debug!("Cleared session {}", self.prefix);
        Ok(())
    }
}

/// FNV-1a, stable across runs and platforms unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Content fingerprint of a video: byte length plus content hash.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{}-{:016x}", bytes.len(), fnv1a(bytes))
}

/// Stable, filesystem-safe key prefix for a video path.
fn session_prefix(video: &Path) -> String {
    let hash = fnv1a(video.to_string_lossy().as_bytes());

    let stem: String = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(32)
        .collect();

    format!("{stem}-{hash:016x}")
}
