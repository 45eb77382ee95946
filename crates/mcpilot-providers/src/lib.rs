//! mcpilot providers: tool-provider processes spoken to over stdio JSON-RPC.
//!
//! - [`transport`]: the `ToolTransport` seam and the MCP stdio implementation
//! - [`session`]: one provider connection and its lifecycle state
//! - [`pool`]: launch, discovery, routing, and teardown across providers

pub mod pool;
pub mod session;
pub mod transport;

pub use pool::ProviderSessionPool;
pub use session::{ConnectionState, ProviderSession};
pub use transport::{RpcClient, RpcTransport, ToolTransport};
