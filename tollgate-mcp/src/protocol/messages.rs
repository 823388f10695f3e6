//! MCP-specific message types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Protocol version this server speaks
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

// === Initialize Protocol ===

/// Parameters for the initialize method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// Client capabilities (shape is client-defined, kept opaque)
    #[serde(default)]
    pub capabilities: Value,

    /// Client information (optional for backward compatibility)
    #[serde(rename = "clientInfo", skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
}

/// Result of the initialize method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// Server capabilities
    pub capabilities: ServerCapabilities,

    /// Server information
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// Capabilities advertised by this server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool support
    pub tools: Value,

    /// Logging notification support
    pub logging: Value,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: serde_json::json!({}),
            logging: serde_json::json!({}),
        }
    }
}

/// Client information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name
    pub name: String,

    /// Client version
    pub version: String,
}

/// Server information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,

    /// Server version
    pub version: String,
}

// === Tool Protocol ===

/// Tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Input schema for the tool
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Result of tools/list method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// List of available tools
    pub tools: Vec<Tool>,
}

/// Parameters for tools/call method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCallParams {
    /// Tool name to call
    pub name: String,

    /// Tool arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of tools/call method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCallResult {
    /// Tool execution content
    pub content: Vec<ToolContent>,

    /// Machine-readable counterpart of the content, when the tool provides one
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,

    /// Whether the tool call is an error
    #[serde(default, rename = "isError")]
    pub is_error: bool,

    /// Additional metadata
    #[serde(flatten)]
    pub metadata: HashMap<String, Value>,
}

impl ToolsCallResult {
    /// Create a plain-text success result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
            metadata: HashMap::new(),
        }
    }

    /// Attach structured content to the result
    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }
}

/// Content returned by tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

// === Logging Notifications ===

/// Severity for notifications/message events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Parameters of a notifications/message push event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    /// Severity level
    pub level: LogLevel,

    /// Message payload
    pub data: Value,

    /// Logger name, when one is relevant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
}
