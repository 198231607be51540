//! BackendRegistry - the connected backends of one run

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::mcp::McpBackend;
use super::{ToolBackend, ToolError, ToolOutput};
use crate::config::BackendConfig;

/// A backend plus its invocation guard
///
/// Backends that require serialized access share one lock across every
/// conversation in the run. The lock is held for a single call only.
#[derive(Clone)]
pub struct GuardedBackend {
    backend: Arc<dyn ToolBackend>,
    lock: Option<Arc<Mutex<()>>>,
}

impl GuardedBackend {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        let lock = backend.requires_serialized_access().then(|| Arc::new(Mutex::new(())));
        Self { backend, lock }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn ToolBackend> {
        &self.backend
    }

    pub fn is_serialized(&self) -> bool {
        self.lock.is_some()
    }

    /// Invoke one tool, holding the guard only for this call
    pub async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        self.backend.call(tool, arguments).await
    }
}

impl std::fmt::Debug for GuardedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedBackend")
            .field("name", &self.name())
            .field("serialized", &self.is_serialized())
            .finish()
    }
}

/// All backends available to a run, in registration order
#[derive(Clone, Debug, Default)]
pub struct BackendRegistry {
    backends: Vec<GuardedBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and initialize every configured MCP backend
    pub async fn connect(configs: &[BackendConfig]) -> Result<Self, ToolError> {
        debug!(count = configs.len(), "BackendRegistry::connect: called");
        let mut registry = Self::new();
        for config in configs {
            let backend = McpBackend::connect(config).await?;
            info!(
                backend = %config.name,
                tools = backend.catalog().len(),
                "BackendRegistry::connect: backend ready"
            );
            registry.register(Arc::new(backend));
        }
        Ok(registry)
    }

    pub fn register(&mut self, backend: Arc<dyn ToolBackend>) {
        debug!(name = backend.name(), "BackendRegistry::register: called");
        self.backends.push(GuardedBackend::new(backend));
    }

    pub fn get(&self, name: &str) -> Option<&GuardedBackend> {
        self.backends.iter().find(|b| b.name() == name)
    }

    /// The named subset, sharing guards with this registry
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<GuardedBackend>, ToolError> {
        names
            .iter()
            .map(|name| {
                self.get(name.as_ref())
                    .cloned()
                    .ok_or_else(|| ToolError::UnknownBackend(name.as_ref().to_string()))
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
