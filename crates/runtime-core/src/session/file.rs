//! File-backed session store. `RUNTIME_SESSION_STORE` names a *directory*,
//! not a file: the store creates it if missing and persists a single JSON
//! document at `<dir>/sessions.json`, keyed by `"{namespace}:{id}"` —
//! matching the on-disk shape the reference tooling asserts against
//! directly (`os.path.join(store_dir, "sessions.json")`, then
//! `store["sessions"][f"{ns}:{sid}"]`).
//!
//! Writes are atomic: serialize to a sibling temp file, then rename over the
//! target, so a crash mid-write never leaves a truncated document.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RuntimeError;

use super::{Session, SessionStore, Turn};

fn key(namespace: &str, id: &str) -> String {
    format!("{namespace}:{id}")
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileDocument {
    sessions: HashMap<String, Session>,
}

pub struct FileSessionStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileSessionStore {
    /// `dir` is created (and any missing parents) if it doesn't exist yet —
    /// the reference harness never pre-creates it.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            RuntimeError::Config(format!("cannot create session store directory {dir:?}: {e}"))
        })?;
        Ok(Self {
            path: dir.join("sessions.json"),
            guard: Mutex::new(()),
        })
    }

    async fn read_document(&self) -> Result<FileDocument, RuntimeError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                RuntimeError::Config(format!("corrupt session store at {:?}: {e}", self.path))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileDocument::default()),
            Err(e) => Err(RuntimeError::Config(format!(
                "cannot read session store at {:?}: {e}",
                self.path
            ))),
        }
    }

    async fn write_document(&self, doc: &FileDocument) -> Result<(), RuntimeError> {
        let data = serde_json::to_vec_pretty(doc)
            .map_err(|e| RuntimeError::Config(format!("cannot serialize session store: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| RuntimeError::Config(format!("cannot write session store: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RuntimeError::Config(format!("cannot commit session store: {e}")))
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<Session>, RuntimeError> {
        let _lock = self.guard.lock().await;
        let doc = self.read_document().await?;
        Ok(doc.sessions.get(&key(namespace, id)).cloned())
    }

    async fn append_turn(
        &self,
        namespace: &str,
        id: &str,
        turn: Turn,
        now: i64,
    ) -> Result<Session, RuntimeError> {
        let _lock = self.guard.lock().await;
        let mut doc = self.read_document().await?;
        let k = key(namespace, id);
        let session = doc
            .sessions
            .entry(k)
            .or_insert_with(|| Session::new(namespace, id, now));
        session.turns.push(turn);
        session.updated_at = now;
        let result = session.clone();
        self.write_document(&doc).await?;
        Ok(result)
    }

    async fn evict_expired(&self, now: i64, ttl_secs: i64) -> Result<usize, RuntimeError> {
        let _lock = self.guard.lock().await;
        let mut doc = self.read_document().await?;
        let cutoff = now - ttl_secs;
        let before = doc.sessions.len();
        doc.sessions.retain(|_, s| s.updated_at >= cutoff);
        let evicted = before - doc.sessions.len();
        if evicted > 0 {
            self.write_document(&doc).await?;
        }
        Ok(evicted)
    }

    async fn health_check(&self) -> Result<(), RuntimeError> {
        let _lock = self.guard.lock().await;
        self.read_document().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();

        store
            .append_turn("default", "s1", Turn { messages: vec![] }, 1)
            .await
            .unwrap();
        let session = store
            .append_turn("default", "s1", Turn { messages: vec![] }, 2)
            .await
            .unwrap();
        assert_eq!(session.turns.len(), 2);

        let raw = tokio::fs::read_to_string(dir.path().join("sessions.json"))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let stored = &value["sessions"]["default:s1"];
        assert_eq!(stored["turns"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested")).unwrap();
        assert!(store.get("ns", "id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("store_dir");
        assert!(!target.exists());
        let store = FileSessionStore::new(&target).unwrap();
        store
            .append_turn("default", "s1", Turn { messages: vec![] }, 1)
            .await
            .unwrap();
        assert!(target.join("sessions.json").is_file());
    }
}
