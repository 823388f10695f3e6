//! Tool registry and tool packs
//!
//! Tools are the external collaborators of the protocol engine: each one is
//! registered with a name, an input schema, and an async handler that may
//! push logging notifications through the session before returning its
//! result. A [`ToolPack`] bundles a set of tools and is selected once at
//! startup by configuration; the router never branches on pack identity.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    error::{McpError, McpResult},
    protocol::{LogLevel, Tool, ToolsCallResult},
    session::ProtocolSession,
};

/// Execution context handed to a tool handler
pub struct ToolContext {
    /// The session the call arrived on; used for notification pushes
    pub session: Arc<ProtocolSession>,

    /// Tool arguments as supplied by the client
    pub arguments: Option<Value>,
}

impl ToolContext {
    pub fn new(session: Arc<ProtocolSession>, arguments: Option<Value>) -> Self {
        Self { session, arguments }
    }

    /// Fetch a required string argument
    pub fn require_str(&self, key: &str) -> McpResult<&str> {
        self.arguments
            .as_ref()
            .and_then(|args| args.get(key))
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::Validation {
                message: format!("Missing or invalid argument '{}'", key),
            })
    }

    /// Fetch a required unsigned integer argument
    pub fn require_u64(&self, key: &str) -> McpResult<u64> {
        self.arguments
            .as_ref()
            .and_then(|args| args.get(key))
            .and_then(Value::as_u64)
            .ok_or_else(|| McpError::Validation {
                message: format!("Missing or invalid argument '{}'", key),
            })
    }
}

/// A tool handler invoked through the registry
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, context: ToolContext) -> McpResult<ToolsCallResult>;
}

/// A registered tool: metadata plus its handler
#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            tool: Tool {
                name: name.into(),
                description: description.into(),
                input_schema,
            },
            handler,
        }
    }
}

/// Tool registry trait for managing available tools
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// List all available tools
    async fn list_tools(&self) -> Vec<Tool>;

    /// Execute a tool by name
    async fn execute_tool(&self, name: &str, context: ToolContext) -> McpResult<ToolsCallResult>;

    /// Check whether a tool exists
    async fn has_tool(&self, name: &str) -> bool;
}

/// Simple in-memory tool registry implementation
#[derive(Clone, Default)]
pub struct InMemoryToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Add a tool to the registry
    pub fn register_tool(&mut self, tool: RegisteredTool) {
        self.tools.insert(tool.tool.name.clone(), tool);
    }
}

#[async_trait]
impl ToolRegistry for InMemoryToolRegistry {
    async fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|t| t.tool.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    async fn execute_tool(&self, name: &str, context: ToolContext) -> McpResult<ToolsCallResult> {
        let registered = self.tools.get(name).ok_or_else(|| McpError::ToolNotFound {
            name: name.to_string(),
        })?;
        registered.handler.call(context).await
    }

    async fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

/// A bundle of tools selected once at server startup
pub trait ToolPack: Send + Sync {
    /// Pack name as referenced by configuration
    fn name(&self) -> &'static str;

    /// Register the pack's tools into a fresh registry
    fn register(&self, registry: &mut InMemoryToolRegistry);
}

/// Resolve a pack by its configured name
pub fn pack_by_name(name: &str) -> Option<Box<dyn ToolPack>> {
    match name {
        "demo" => Some(Box::new(DemoToolPack)),
        _ => None,
    }
}

/// The demonstration pack: `greet` and `count`
pub struct DemoToolPack;

impl ToolPack for DemoToolPack {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn register(&self, registry: &mut InMemoryToolRegistry) {
        registry.register_tool(RegisteredTool::new(
            "greet",
            "Greet someone by name",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Name to greet"}
                },
                "required": ["name"]
            }),
            Arc::new(GreetTool),
        ));

        registry.register_tool(RegisteredTool::new(
            "count",
            "Count up to a number, emitting one log notification per step",
            json!({
                "type": "object",
                "properties": {
                    "number": {"type": "integer", "description": "Count target", "minimum": 1}
                },
                "required": ["number"]
            }),
            Arc::new(CountTool {
                step_delay: Duration::from_millis(100),
            }),
        ));
    }
}

struct GreetTool;

#[async_trait]
impl ToolHandler for GreetTool {
    async fn call(&self, context: ToolContext) -> McpResult<ToolsCallResult> {
        let name = context.require_str("name")?;
        let greeting = format!("Hello, {}!", name);
        Ok(ToolsCallResult::text(greeting.clone())
            .with_structured(json!({ "greeting": greeting })))
    }
}

struct CountTool {
    step_delay: Duration,
}

#[async_trait]
impl ToolHandler for CountTool {
    async fn call(&self, context: ToolContext) -> McpResult<ToolsCallResult> {
        let number = context.require_u64("number")?;
        if number == 0 {
            return Err(McpError::Validation {
                message: "Argument 'number' must be at least 1".to_string(),
            });
        }

        // Suspends between steps so other sessions keep being serviced.
        for i in 1..=number {
            context
                .session
                .notify_log(LogLevel::Info, json!(format!("count: {}", i)))
                .await;
            tokio::time::sleep(self.step_delay).await;
        }

        Ok(ToolsCallResult::text(format!("Counted to {}", number))
            .with_structured(json!({ "counted": number })))
    }
}
