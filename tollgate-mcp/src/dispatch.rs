//! Per-session JSON-RPC dispatch
//!
//! Once the router has resolved a session, requests land here. Protocol
//! failures (unknown method, bad params, tool errors) become JSON-RPC error
//! envelopes so the session stays alive; only transport-level problems are
//! surfaced as HTTP errors upstream.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::{
    error::{McpError, McpResult},
    protocol::{
        InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ServerCapabilities,
        ServerInfo, ToolsCallParams, ToolsListResult, MCP_PROTOCOL_VERSION,
    },
    session::ProtocolSession,
    tools::{ToolContext, ToolRegistry},
};

/// JSON-RPC dispatcher bound to one tool registry
pub struct Dispatcher {
    registry: Arc<dyn ToolRegistry>,
    server_info: ServerInfo,
}

impl Dispatcher {
    pub fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self {
            registry,
            server_info: ServerInfo {
                name: "tollgate-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Handle a request routed to `session`.
    ///
    /// Returns `None` for notifications (no `id`), which expect no response
    /// envelope.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        session: Arc<ProtocolSession>,
    ) -> Option<JsonRpcResponse> {
        debug!(
            session_id = %session.session_id,
            method = %request.method,
            "dispatching request"
        );

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let id = request.id.clone();
        let result = self.dispatch_method(&request, session).await;

        let response = match result {
            Ok(value) => JsonRpcResponse::success(value, id),
            Err(err) => {
                error!(method = %request.method, error = %err, "request failed");
                JsonRpcResponse::error(err.to_jsonrpc_error(), id)
            }
        };
        Some(response)
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                debug!("client reported initialization complete");
            }
            other => {
                debug!(method = %other, "ignoring unknown notification");
            }
        }
    }

    async fn dispatch_method(
        &self,
        request: &JsonRpcRequest,
        session: Arc<ProtocolSession>,
    ) -> McpResult<Value> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params.clone()),
            "ping" => Ok(serde_json::json!({"status": "pong"})),
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params.clone(), session).await,
            other => Err(McpError::ToolNotFound {
                name: other.to_string(),
            }),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = match params {
            Some(params) => serde_json::from_value(params).map_err(|e| McpError::Protocol {
                message: format!("Invalid initialize params: {}", e),
            })?,
            None => {
                return Err(McpError::Protocol {
                    message: "initialize requires parameters".to_string(),
                })
            }
        };

        debug!(
            client = ?params.client_info.as_ref().map(|c| c.name.as_str()),
            protocol_version = %params.protocol_version,
            "initializing session"
        );

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: self.server_info.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_tools_list(&self) -> McpResult<Value> {
        let tools = self.registry.list_tools().await;
        Ok(serde_json::to_value(ToolsListResult { tools })?)
    }

    async fn handle_tools_call(
        &self,
        params: Option<Value>,
        session: Arc<ProtocolSession>,
    ) -> McpResult<Value> {
        let params: ToolsCallParams = match params {
            Some(params) => serde_json::from_value(params).map_err(|e| McpError::Protocol {
                message: format!("Invalid tools/call params: {}", e),
            })?,
            None => {
                return Err(McpError::Protocol {
                    message: "tools/call requires parameters".to_string(),
                })
            }
        };

        let context = ToolContext::new(session, params.arguments);
        let result = self.registry.execute_tool(&params.name, context).await?;
        Ok(serde_json::to_value(result)?)
    }
}
