//! Provider session pool: launches providers, discovers their tools, routes
//! calls, and tears everything down.
//!
//! Sessions are kept in registration order; that order is the order tools
//! appear in the prompt catalogue.

use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

use mcpilot_core::config::ServerConfig;
use mcpilot_core::{Error, Result, ToolDescriptor};

use crate::session::{ConnectionState, ProviderSession};
use crate::transport::{RpcTransport, ToolTransport};

/// Owns every provider session for the lifetime of the agent.
#[derive(Debug, Default)]
pub struct ProviderSessionPool {
    sessions: Vec<ProviderSession>,
}

impl ProviderSessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch one configured provider and run handshake + discovery.
    ///
    /// Start, handshake, and `tools/list` share the server's startup
    /// timeout. On failure the provider is recorded as `Failed` (so `status`
    /// can show it) and a `ProviderLaunch` error is returned.
    pub async fn connect(&mut self, config: &ServerConfig) -> Result<()> {
        self.ensure_unique(&config.id)?;

        let outcome: Result<(Box<dyn ToolTransport>, Vec<ToolDescriptor>)> = async {
            let resolved = config.resolved().map_err(|e| Error::launch(&config.id, e))?;
            let transport = RpcTransport::spawn(&resolved)?;
            let limit = config.startup_timeout();
            match tokio::time::timeout(limit, discover(&config.id, Box::new(transport))).await {
                Ok(r) => r,
                Err(_) => Err(Error::launch(
                    &config.id,
                    format!("no handshake within {}s", limit.as_secs()),
                )),
            }
        }
        .await;

        match outcome {
            Ok((transport, tools)) => {
                self.register(&config.id, transport, tools, config.call_timeout());
                Ok(())
            }
            Err(e) => {
                let err = match e {
                    launch @ Error::ProviderLaunch { .. } => launch,
                    other => Error::launch(&config.id, other),
                };
                warn!(provider = %config.id, error = %err, "provider unavailable");
                self.sessions
                    .push(ProviderSession::failed(&config.id, err.to_string()));
                Err(err)
            }
        }
    }

    /// Register an already-open transport under `id` (handshake + discovery
    /// still run). Used for in-process providers and tests.
    pub async fn attach(
        &mut self,
        id: &str,
        transport: Box<dyn ToolTransport>,
        call_timeout: Option<Duration>,
    ) -> Result<()> {
        self.ensure_unique(id)?;
        let (transport, tools) = discover(id, transport).await?;
        self.register(id, transport, tools, call_timeout);
        Ok(())
    }

    /// Connect every config in order. Failures are logged and collected;
    /// the remaining providers still start.
    pub async fn connect_all<'a>(
        &mut self,
        configs: impl IntoIterator<Item = &'a ServerConfig>,
    ) -> Vec<Error> {
        let mut failures = Vec::new();
        for config in configs {
            if let Err(e) = self.connect(config).await {
                failures.push(e);
            }
        }
        failures
    }

    /// Route one call to the named provider.
    pub async fn invoke(
        &self,
        provider_id: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<String> {
        self.session(provider_id)
            .ok_or_else(|| Error::UnknownProvider(provider_id.to_string()))?
            .invoke(tool, arguments)
            .await
    }

    /// Close one session. Closing twice is a no-op.
    pub async fn close(&self, provider_id: &str) -> Result<()> {
        self.session(provider_id)
            .ok_or_else(|| Error::UnknownProvider(provider_id.to_string()))?
            .close()
            .await
    }

    /// Close every session, logging (not returning) individual failures.
    pub async fn close_all(&self) {
        for session in &self.sessions {
            if let Err(e) = session.close().await {
                warn!(provider = %session.id(), error = %e, "error while closing provider");
            }
        }
    }

    pub fn session(&self, provider_id: &str) -> Option<&ProviderSession> {
        self.sessions.iter().find(|s| s.id() == provider_id)
    }

    pub fn sessions(&self) -> &[ProviderSession] {
        &self.sessions
    }

    /// `(id, state)` for every session, in registration order.
    pub fn session_states(&self) -> Vec<(String, ConnectionState)> {
        self.sessions
            .iter()
            .map(|s| (s.id().to_string(), s.state()))
            .collect()
    }

    /// Tools of every ready provider, provider order then declaration order.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.sessions
            .iter()
            .filter(|s| s.state() == ConnectionState::Ready)
            .flat_map(|s| s.tools().iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn ensure_unique(&self, id: &str) -> Result<()> {
        if self.session(id).is_some() {
            return Err(Error::Config(format!("provider '{id}' is already registered")));
        }
        Ok(())
    }

    fn register(
        &mut self,
        id: &str,
        transport: Box<dyn ToolTransport>,
        tools: Vec<ToolDescriptor>,
        call_timeout: Option<Duration>,
    ) {
        info!(provider = %id, tools = tools.len(), "provider ready");
        self.sessions
            .push(ProviderSession::ready(id, transport, tools, call_timeout));
    }
}

/// Handshake then list tools. The transport is closed if either step fails.
async fn discover(
    id: &str,
    mut transport: Box<dyn ToolTransport>,
) -> Result<(Box<dyn ToolTransport>, Vec<ToolDescriptor>)> {
    let result: Result<Vec<ToolDescriptor>> = async {
        transport.initialize().await?;
        transport.list_tools().await
    }
    .await;

    match result {
        Ok(tools) => Ok((transport, tools)),
        Err(e) => {
            let _ = transport.close().await;
            Err(Error::launch(id, e))
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
