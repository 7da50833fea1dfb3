//! Networked KV-backed session store: a minimal RESP (REdis Serialization
//! Protocol) client good enough for `AUTH` / `SELECT` / `GET` / `SET` against
//! any RESP-speaking store. No connection pooling — a fresh connection is
//! opened per call, which is adequate for session traffic (one round trip
//! per chat request) and keeps the client free of background tasks.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::RuntimeError;

use super::{Session, SessionStore, Turn};

fn key(namespace: &str, id: &str) -> String {
    format!("session:{namespace}:{id}")
}

pub struct KvSessionStore {
    endpoint: String,
    password: Option<String>,
    db: u32,
}

impl KvSessionStore {
    pub fn new(endpoint: impl Into<String>, password: Option<String>, db: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            password,
            db,
        }
    }

    async fn connect(&self) -> Result<TcpStream, RuntimeError> {
        TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| RuntimeError::Config(format!("kv store connect failed: {e}")))
    }

    async fn authenticated(&self) -> Result<TcpStream, RuntimeError> {
        let mut conn = self.connect().await?;
        if let Some(password) = &self.password {
            send_command(&mut conn, &["AUTH", password]).await?;
            expect_ok(&mut conn).await?;
        }
        if self.db != 0 {
            send_command(&mut conn, &["SELECT", &self.db.to_string()]).await?;
            expect_ok(&mut conn).await?;
        }
        Ok(conn)
    }
}

fn encode_command(parts: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

async fn send_command(conn: &mut TcpStream, parts: &[&str]) -> Result<(), RuntimeError> {
    conn.write_all(&encode_command(parts))
        .await
        .map_err(|e| RuntimeError::Config(format!("kv store write failed: {e}")))
}

async fn read_line(conn: &mut TcpStream) -> Result<String, RuntimeError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = conn
            .read(&mut byte)
            .await
            .map_err(|e| RuntimeError::Config(format!("kv store read failed: {e}")))?;
        if n == 0 {
            return Err(RuntimeError::Config("kv store closed connection".into()));
        }
        if byte[0] == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            break;
        }
        line.push(byte[0]);
    }
    String::from_utf8(line).map_err(|e| RuntimeError::Config(format!("kv store sent non-utf8 line: {e}")))
}

async fn expect_ok(conn: &mut TcpStream) -> Result<(), RuntimeError> {
    let line = read_line(conn).await?;
    if line.starts_with('+') || line.starts_with(':') {
        Ok(())
    } else if let Some(msg) = line.strip_prefix('-') {
        Err(RuntimeError::Config(format!("kv store error: {msg}")))
    } else {
        Err(RuntimeError::Config(format!("unexpected kv store reply: {line}")))
    }
}

/// Reads one RESP bulk-string reply, returning `None` for `$-1` (nil).
async fn read_bulk_string(conn: &mut TcpStream) -> Result<Option<String>, RuntimeError> {
    let header = read_line(conn).await?;
    match header.chars().next() {
        Some('$') => {
            let len: i64 = header[1..]
                .parse()
                .map_err(|_| RuntimeError::Config(format!("bad bulk length: {header}")))?;
            if len < 0 {
                return Ok(None);
            }
            let mut data = vec![0u8; len as usize + 2]; // + trailing \r\n
            conn.read_exact(&mut data)
                .await
                .map_err(|e| RuntimeError::Config(format!("kv store read failed: {e}")))?;
            data.truncate(len as usize);
            String::from_utf8(data)
                .map(Some)
                .map_err(|e| RuntimeError::Config(format!("kv store sent non-utf8 payload: {e}")))
        }
        Some('-') => Err(RuntimeError::Config(format!(
            "kv store error: {}",
            &header[1..]
        ))),
        _ => Err(RuntimeError::Config(format!(
            "unexpected kv store reply: {header}"
        ))),
    }
}

#[async_trait::async_trait]
impl SessionStore for KvSessionStore {
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<Session>, RuntimeError> {
        let mut conn = self.authenticated().await?;
        send_command(&mut conn, &["GET", &key(namespace, id)]).await?;
        let reply = read_bulk_string(&mut conn).await?;
        match reply {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| RuntimeError::Config(format!("corrupt session value: {e}"))),
        }
    }

    async fn append_turn(
        &self,
        namespace: &str,
        id: &str,
        turn: Turn,
        now: i64,
    ) -> Result<Session, RuntimeError> {
        let mut session = self
            .get(namespace, id)
            .await?
            .unwrap_or_else(|| Session::new(namespace, id, now));
        session.turns.push(turn);
        session.updated_at = now;

        let mut conn = self.authenticated().await?;
        let payload = serde_json::to_string(&session)
            .map_err(|e| RuntimeError::Config(format!("cannot serialize session: {e}")))?;
        send_command(&mut conn, &["SET", &key(namespace, id), &payload]).await?;
        expect_ok(&mut conn).await?;
        Ok(session)
    }

    /// The remote store owns its own expiry policy; this client does not
    /// actively scan for stale keys.
    async fn evict_expired(&self, _now: i64, _ttl_secs: i64) -> Result<usize, RuntimeError> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), RuntimeError> {
        let mut conn = self.authenticated().await?;
        send_command(&mut conn, &["PING"]).await?;
        let line = read_line(&mut conn).await?;
        if line.starts_with('+') {
            Ok(())
        } else {
            Err(RuntimeError::Config(format!("kv store ping failed: {line}")))
        }
    }
}
