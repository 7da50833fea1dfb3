//! Pluggable session storage (spec §3 Session, §4.H).
//!
//! A `Session` accumulates `Turn`s; hydration unconditionally re-plays every
//! stored turn's messages ahead of the caller's latest turn whenever a
//! resolved session id already has history (SPEC_FULL §4.P). Backends:
//! in-memory (`memory`), file-backed (`file`), and a small networked KV
//! client (`kv`). `lock` serializes concurrent access to a single session id.

pub mod file;
pub mod kv;
pub mod lock;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::message::Message;

/// One request/response exchange worth of messages, stored verbatim so
/// hydration can reconstruct the conversation the backend originally saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub namespace: String,
    pub turns: Vec<Turn>,
    pub updated_at: i64,
}

impl Session {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            turns: Vec::new(),
            updated_at: now,
        }
    }

    /// Every message across every stored turn, in order — the hydrated
    /// history handed to the backend ahead of the caller's latest turn.
    pub fn history(&self) -> Vec<Message> {
        self.turns.iter().flat_map(|t| t.messages.clone()).collect()
    }
}

/// A storage backend keyed by `(namespace, session_id)`. Implementors own
/// persistence; `SessionStore` callers serialize concurrent access via
/// [`lock::SessionLocks`] before calling in.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session, or `None` if it has never been created.
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<Session>, RuntimeError>;

    /// Append a turn, creating the session first if needed, and return the
    /// session as it now stands (including the just-appended turn).
    async fn append_turn(
        &self,
        namespace: &str,
        id: &str,
        turn: Turn,
        now: i64,
    ) -> Result<Session, RuntimeError>;

    /// Evict sessions whose `updated_at` is older than `now - ttl_secs`.
    /// Backends that don't support eviction (e.g. a remote KV with its own
    /// expiry) are free to make this a no-op.
    async fn evict_expired(&self, now: i64, ttl_secs: i64) -> Result<usize, RuntimeError>;

    async fn health_check(&self) -> Result<(), RuntimeError>;
}
