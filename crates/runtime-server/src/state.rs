//! Shared application state (spec §4.A, §5 Concurrency & Resource Model).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use runtime_core::config::{RuntimeConfig, SessionStoreKind};
use runtime_core::error::RuntimeError;
use runtime_core::orchestrator::OrchestratorConfig;
use runtime_core::session::file::FileSessionStore;
use runtime_core::session::kv::KvSessionStore;
use runtime_core::session::lock::SessionLocks;
use runtime_core::session::memory::MemorySessionStore;
use runtime_core::session::SessionStore;
use runtime_core::tools::ToolRegistry;

use runtime_mcp::McpRegistry;

use crate::provider::ProviderRegistry;

const MCP_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RuntimeConfig>,
    pub providers: Arc<ProviderRegistry>,
    pub mcp: Arc<McpRegistry>,
    pub tools: Arc<RwLock<ToolRegistry>>,
    pub sessions: Arc<dyn SessionStore>,
    pub session_locks: Arc<SessionLocks>,
    pub orchestrator: OrchestratorConfig,
}

impl AppState {
    pub fn build(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let providers = ProviderRegistry::from_config(&config);
        let mcp = Arc::new(McpRegistry::new(&config.mcp_hosts, MCP_CALL_TIMEOUT).map_err(|e| {
            RuntimeError::Config(format!("failed to build mcp registry: {e}"))
        })?);
        let tools = Arc::new(RwLock::new(ToolRegistry::new(mcp.clone(), MCP_CALL_TIMEOUT)));

        let sessions: Arc<dyn SessionStore> = match config.session_store.kind {
            SessionStoreKind::Memory => Arc::new(MemorySessionStore::new()),
            SessionStoreKind::File => {
                let path = config.session_store.path.clone().ok_or_else(|| {
                    RuntimeError::Config("file session store requires RUNTIME_SESSION_STORE".to_string())
                })?;
                Arc::new(FileSessionStore::new(path)?)
            }
            SessionStoreKind::MiniMemory => {
                let endpoint = config.session_store.endpoint.clone().ok_or_else(|| {
                    RuntimeError::Config(
                        "minimemory session store requires RUNTIME_SESSION_STORE_ENDPOINT".to_string(),
                    )
                })?;
                Arc::new(KvSessionStore::new(
                    endpoint,
                    config.session_store.password.clone(),
                    config.session_store.db,
                ))
            }
        };

        Ok(Self {
            config: Arc::new(config),
            providers: Arc::new(providers),
            mcp,
            tools,
            sessions,
            session_locks: Arc::new(SessionLocks::default()),
            orchestrator: OrchestratorConfig::default(),
        })
    }
}
