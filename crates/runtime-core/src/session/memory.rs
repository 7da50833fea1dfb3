//! In-process session store. Default backend; lost on restart.

use dashmap::DashMap;

use crate::error::RuntimeError;

use super::{Session, SessionStore, Turn};

fn key(namespace: &str, id: &str) -> String {
    format!("{namespace}:{id}")
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<Session>, RuntimeError> {
        Ok(self.sessions.get(&key(namespace, id)).map(|e| e.clone()))
    }

    async fn append_turn(
        &self,
        namespace: &str,
        id: &str,
        turn: Turn,
        now: i64,
    ) -> Result<Session, RuntimeError> {
        let k = key(namespace, id);
        let mut entry = self
            .sessions
            .entry(k)
            .or_insert_with(|| Session::new(namespace, id, now));
        entry.turns.push(turn);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn evict_expired(&self, now: i64, ttl_secs: i64) -> Result<usize, RuntimeError> {
        let cutoff = now - ttl_secs;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.updated_at < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for k in &expired {
            self.sessions.remove(k);
        }
        Ok(expired.len())
    }

    async fn health_check(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
