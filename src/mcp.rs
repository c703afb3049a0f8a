//! MCP JSON-RPC protocol bridge.
//!
//! Adapts the [`ToolRegistry`] to the MCP Streamable HTTP transport mounted
//! at `/mcp`. MCP clients see exactly the tools `GET /tools/list` reports.
//!
//! Tool failures are JSON-RPC errors: `invalid_arguments` becomes
//! `INVALID_PARAMS`, `not_found` becomes `RESOURCE_NOT_FOUND`, anything else
//! `INTERNAL_ERROR`.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::error::{classify, ErrorCode as HarvestCode};
use crate::traits::{ToolContext, ToolRegistry};

/// Each MCP session receives a clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct McpBridge {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl McpBridge {
    pub fn new(tools: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { tools, ctx }
    }

    /// Converts a harvest tool into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        // Scans write to the local store; everything else only reads.
        let read_only = !tool.name().starts_with("scan_");

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(read_only)),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

/// Text shown to the MCP client for a tool result.
fn result_text(result: &serde_json::Value) -> String {
    match result.get("text").and_then(|t| t.as_str()) {
        Some(text) => text.to_string(),
        None => serde_json::to_string_pretty(result).unwrap_or_default(),
    }
}

fn to_mcp_error(err: anyhow::Error) -> McpError {
    let code = match classify(&err) {
        HarvestCode::InvalidArguments => ErrorCode::INVALID_PARAMS,
        HarvestCode::NotFound => ErrorCode::RESOURCE_NOT_FOUND,
        HarvestCode::Internal => ErrorCode::INTERNAL_ERROR,
    };
    McpError::new(code, format!("{:#}", err), None)
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "component-harvest".to_string(),
                title: Some("Component Harvest".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Harvests UI components from shadcn-style registries. Scan a component by \
                 name with scan_<source>_component, then call get_<source>_component_prompt \
                 for integration instructions. list_harvested_components shows what has \
                 been stored."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if self.tools.find(&request.name).is_none() {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            ));
        }

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let result = self
            .tools
            .call(&request.name, &params, &self.ctx)
            .await
            .map_err(to_mcp_error)?;
        Ok(CallToolResult::success(vec![Content::text(result_text(
            &result,
        ))]))
    }
}
