//! One live connection to a tool provider.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use mcpilot_core::{Error, Result, ToolDescriptor};

use crate::transport::ToolTransport;

/// Lifecycle of a provider session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Closed,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A provider session: its discovered tools plus the transport behind a lock.
///
/// The transport lock serializes calls, so at most one request is in flight
/// per provider. Different providers never share a lock.
pub struct ProviderSession {
    id: String,
    tools: Vec<ToolDescriptor>,
    call_timeout: Option<Duration>,
    state: StdMutex<ConnectionState>,
    /// Cleared on close or failure.
    transport: Mutex<Option<Box<dyn ToolTransport>>>,
    /// Launch failure reason, shown by `mcpilot tools`.
    failure: Option<String>,
}

impl ProviderSession {
    /// A ready session with an already-discovered catalogue.
    pub fn ready(
        id: impl Into<String>,
        transport: Box<dyn ToolTransport>,
        tools: Vec<ToolDescriptor>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id: id.into(),
            tools,
            call_timeout,
            state: StdMutex::new(ConnectionState::Ready),
            transport: Mutex::new(Some(transport)),
            failure: None,
        }
    }

    /// A placeholder for a provider that never came up.
    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tools: Vec::new(),
            call_timeout: None,
            state: StdMutex::new(ConnectionState::Failed),
            transport: Mutex::new(None),
            failure: Some(reason.into()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Invoke one tool. Waits for any in-flight call on this provider first.
    ///
    /// A provider that drops its connection mid-call is marked `Failed` and
    /// reported as `ProviderLaunch`; later calls fail the same way.
    pub async fn invoke(&self, tool: &str, arguments: Map<String, Value>) -> Result<String> {
        let mut guard = self.transport.lock().await;

        let state = self.state();
        let transport = match (state, guard.as_mut()) {
            (ConnectionState::Ready, Some(t)) => t,
            _ => {
                return Err(Error::launch(
                    &self.id,
                    format!("session is {state}, cannot call '{tool}'"),
                ))
            }
        };

        debug!(provider = %self.id, tool, "invoking tool");
        let call = transport.call_tool(tool, arguments);
        let result = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(r) => r,
                Err(_) => Err(Error::ToolExecution {
                    provider: self.id.clone(),
                    tool: tool.to_string(),
                    message: format!("no response within {}s", limit.as_secs_f64()),
                }),
            },
            None => call.await,
        };

        match result {
            Err(Error::ProviderClosed(_)) => {
                warn!(provider = %self.id, tool, "provider exited during call");
                self.set_state(ConnectionState::Failed);
                if let Some(mut dead) = guard.take() {
                    let _ = dead.close().await;
                }
                Err(Error::launch(&self.id, format!("provider exited while running '{tool}'")))
            }
            other => other,
        }
    }

    /// Tear down the transport. A second call is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.transport.lock().await;
        let Some(mut transport) = guard.take() else {
            return Ok(());
        };
        let result = transport.close().await;
        if self.state() != ConnectionState::Failed {
            self.set_state(ConnectionState::Closed);
        }
        result
    }
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("tools", &self.tools.len())
            .finish()
    }
}
