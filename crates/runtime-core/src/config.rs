//! Environment-driven process configuration (spec §4.K, §6; SPEC_FULL §4.N).
//!
//! Unknown variables are ignored; only the names below are read.

use std::env;
use std::time::Duration;

use crate::error::RuntimeError;

/// spec.md's `RUNTIME_SESSION_STORE_TYPE` vocabulary — exactly these three
/// values. `MiniMemory` ("mini redis") is the networked RESP-speaking
/// backend, not a second in-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreKind {
    Memory,
    File,
    MiniMemory,
}

#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    pub kind: SessionStoreKind,
    pub path: Option<String>,
    pub endpoint: Option<String>,
    pub password: Option<String>,
    pub db: u32,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct LlamaCppConfig {
    pub model: Option<String>,
    pub n_batch: Option<u32>,
    pub n_ubatch: Option<u32>,
    pub flash_attn: bool,
    pub unload_after_chat: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub default_provider: String,
    pub workspace_root: String,
    pub mcp_hosts: Vec<String>,
    pub session_store: SessionStoreConfig,
    pub llama_cpp: LlamaCppConfig,
    pub lmdeploy_host: Option<String>,
    pub mnn_host: Option<String>,
    pub ollama_host: Option<String>,
    pub request_timeout: Duration,
    pub session_ttl_secs: i64,
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, RuntimeError> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v
            .parse::<T>()
            .map(Some)
            .map_err(|_| RuntimeError::Config(format!("invalid value for {key}: {v}"))),
        _ => Ok(None),
    }
}

fn env_bool(key: &str) -> bool {
    matches!(
        env::var(key).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, RuntimeError> {
        let listen_host = env_str("RUNTIME_LISTEN_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let listen_port = env_parse::<u16>("RUNTIME_LISTEN_PORT")?.unwrap_or(8080);
        let default_provider =
            env_str("RUNTIME_PROVIDER").ok_or_else(|| {
                RuntimeError::Config("RUNTIME_PROVIDER must be set".to_string())
            })?;
        let workspace_root =
            env_str("RUNTIME_WORKSPACE_ROOT").unwrap_or_else(|| ".".to_string());
        let mcp_hosts = env_str("MCP_HOSTS")
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let store_kind = match env_str("RUNTIME_SESSION_STORE_TYPE").as_deref() {
            Some("memory") => SessionStoreKind::Memory,
            Some("minimemory") => SessionStoreKind::MiniMemory,
            Some("file") => SessionStoreKind::File,
            Some(other) => {
                return Err(RuntimeError::Config(format!(
                    "invalid RUNTIME_SESSION_STORE_TYPE: {other}"
                )))
            }
            // RUNTIME_SESSION_STORE (a path) implies file-backed when the type isn't named.
            None if env_str("RUNTIME_SESSION_STORE").is_some() => SessionStoreKind::File,
            None => SessionStoreKind::Memory,
        };

        let session_store = SessionStoreConfig {
            kind: store_kind,
            path: env_str("RUNTIME_SESSION_STORE"),
            endpoint: env_str("RUNTIME_SESSION_STORE_ENDPOINT"),
            password: env_str("RUNTIME_SESSION_STORE_PASSWORD"),
            db: env_parse::<u32>("RUNTIME_SESSION_STORE_DB")?.unwrap_or(0),
            namespace: env_str("RUNTIME_SESSION_STORE_NAMESPACE")
                .unwrap_or_else(|| "default".to_string()),
        };

        let llama_cpp = LlamaCppConfig {
            model: env_str("LLAMA_CPP_MODEL"),
            n_batch: env_parse::<u32>("LLAMA_CPP_N_BATCH")?,
            n_ubatch: env_parse::<u32>("LLAMA_CPP_N_UBATCH")?,
            flash_attn: env_bool("LLAMA_CPP_FLASH_ATTN"),
            unload_after_chat: env_bool("LLAMA_CPP_UNLOAD_AFTER_CHAT"),
        };

        Ok(Self {
            listen_host,
            listen_port,
            default_provider,
            workspace_root,
            mcp_hosts,
            session_store,
            llama_cpp,
            lmdeploy_host: env_str("LMDEPLOY_HOST"),
            mnn_host: env_str("MNN_HOST"),
            ollama_host: env_str("OLLAMA_HOST"),
            request_timeout: Duration::from_secs(300),
            session_ttl_secs: env_parse::<i64>("RUNTIME_SESSION_TTL_SECS")?.unwrap_or(86_400),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_default_provider_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("RUNTIME_PROVIDER");
        let err = RuntimeConfig::from_env().unwrap_err();
        assert_eq!(err.type_tag(), "config");
    }

    #[test]
    fn mcp_hosts_split_on_comma() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("RUNTIME_PROVIDER", "mnn");
        env::set_var("MCP_HOSTS", "http://a/, http://b/");
        let cfg = RuntimeConfig::from_env().unwrap();
        assert_eq!(cfg.mcp_hosts, vec!["http://a/".to_string(), "http://b/".to_string()]);
        env::remove_var("RUNTIME_PROVIDER");
        env::remove_var("MCP_HOSTS");
    }
}
