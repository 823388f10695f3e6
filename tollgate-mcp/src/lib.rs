//! # tollgate-mcp: session-oriented MCP server
//!
//! An MCP (JSON-RPC-over-HTTP) server with streamable HTTP transport:
//! POST `/mcp` carries JSON-RPC requests, GET `/mcp` opens a Server-Sent
//! Events stream for out-of-band notifications, and DELETE `/mcp`
//! terminates the session. Sessions are created only by a well-formed
//! `initialize` request and identified by the `Mcp-Session-Id` header on
//! every subsequent call.
//!
//! ## Architecture
//!
//! - [`protocol`] - JSON-RPC 2.0 envelope and MCP message payloads
//! - [`session`] - session table and per-session notification channel
//! - [`router`] - the HTTP surface: create-or-route, subscribe, terminate
//! - [`dispatch`] - per-session JSON-RPC dispatch
//! - [`tools`] - tool registry and the startup-selected tool pack
//! - [`config`] - environment-sourced configuration
//! - [`error`] - error types and their HTTP/JSON-RPC mappings
//!
//! Authentication lives in the companion `tollgate-auth` crate; the binary
//! layers its gate middleware in front of [`router::mcp_routes`].
//!
//! ## Notification semantics
//!
//! Tools may push logging notifications through their session while they
//! run. Delivery is best-effort: a session with no subscribed stream drops
//! pushes silently, and at most one stream is bound per session; a second
//! subscriber displaces the first.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;
pub mod tools;

pub use config::{ServerConfig, TokenMode};
pub use error::{McpError, McpResult};
pub use router::{mcp_routes, McpState, SESSION_ID_HEADER};
pub use session::{ProtocolSession, SessionManager};
pub use tools::{pack_by_name, DemoToolPack, InMemoryToolRegistry, ToolPack, ToolRegistry};
