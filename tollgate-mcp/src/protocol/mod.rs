//! MCP protocol layer: JSON-RPC 2.0 envelope plus MCP message payloads

pub mod jsonrpc;
pub mod messages;

pub use jsonrpc::{JsonRpcError, JsonRpcErrorCode, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use messages::{
    ClientInfo, InitializeParams, InitializeResult, LogLevel, LoggingMessageParams,
    ServerCapabilities, ServerInfo, Tool, ToolContent, ToolsCallParams, ToolsCallResult,
    ToolsListResult, MCP_PROTOCOL_VERSION,
};
