//! The tool surface.
//!
//! Every operation an agent can invoke is a [`Tool`]: a name, a one-line
//! description, a JSON Schema for its parameters, and an async `execute`.
//! The set of tools is not fixed. [`ToolRegistry::for_sources`] derives it
//! from the configured sources, so adding a source to the config adds its
//! tools to every transport.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  ToolRegistry                    │
//! │  scan_<source>_component        (every source)   │
//! │  get_<source>_component_prompt  (every source)   │
//! │  list_<source>_components       (inline sources) │
//! │  list_harvested_components                       │
//! └──────────────┬───────────────────────────────────┘
//!                ▼
//!   POST /tools/{name}   and   MCP tools/call on /mcp
//! ```
//!
//! Parameters are checked with [`validate_params`] before `execute` runs.
//! Tools fail with [`HarvestError`] wrapped in `anyhow`, which the transports
//! classify into wire error codes with [`crate::error::classify`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::HarvestError;
use crate::harvest::{format_harvested, format_registry, Harvester};
use crate::models::{SourceFilter, SourceShape};

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// An operation that agents can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`) and MCP tool name.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether this tool belongs to a particular source (false for
    /// cross-source tools). Reported as `"source"` in `GET /tools/list`.
    fn source(&self) -> Option<&str> {
        None
    }

    /// JSON Schema for the parameters: `type: "object"`, `properties`, and
    /// optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Execute with validated parameters.
    ///
    /// The returned object always carries a `"text"` field holding the
    /// human-readable result; other fields are structured data.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Tool metadata returned by `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            source: tool.source().map(str::to_string),
            parameters: tool.parameters_schema(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What tools execute against. Shared by every invocation.
#[derive(Clone)]
pub struct ToolContext {
    harvester: Arc<Harvester>,
}

impl ToolContext {
    pub fn new(harvester: Arc<Harvester>) -> Self {
        Self { harvester }
    }

    pub fn harvester(&self) -> &Harvester {
        &self.harvester
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter validation
// ═══════════════════════════════════════════════════════════════════════

/// Validates `params` against a tool's schema and fills in defaults.
///
/// Checks required fields, JSON types, and `enum` membership. Unknown
/// fields pass through untouched.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value, HarvestError> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(HarvestError::invalid(format!(
                "parameters must be an object, got {}",
                json_type_name(other)
            )))
        }
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            return Err(HarvestError::invalid(format!(
                "missing required parameter: {}",
                field
            )));
        }
    }

    let mut result = params_obj.clone();
    for (prop_name, prop_schema) in &properties {
        match params_obj.get(prop_name) {
            Some(value) => {
                if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
                    let type_ok = match expected {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !type_ok {
                        return Err(HarvestError::invalid(format!(
                            "parameter '{}' must be of type '{}', got {}",
                            prop_name,
                            expected,
                            json_type_name(value)
                        )));
                    }
                }
                if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                    if !allowed.contains(value) {
                        let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                        return Err(HarvestError::invalid(format!(
                            "parameter '{}' must be one of [{}], got {}",
                            prop_name,
                            allowed.join(", "),
                            value
                        )));
                    }
                }
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    result.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, HarvestError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HarvestError::invalid(format!("{} must not be empty", field)))
}

// ═══════════════════════════════════════════════════════════════════════
// Tools
// ═══════════════════════════════════════════════════════════════════════

/// `scan_<source>_component`: resolve a name and persist its payload.
pub struct ScanTool {
    source: String,
    name: String,
    description: String,
}

impl ScanTool {
    pub fn new(source: &str, shape: SourceShape) -> Self {
        let description = match shape {
            SourceShape::Reference => format!(
                "Fetch a {} component's full source by name and store it locally",
                source
            ),
            SourceShape::Inline => format!(
                "Record a {} component's registry metadata by name and store it locally",
                source
            ),
        };
        Self {
            source: source.to_string(),
            name: format!("scan_{}_component", source),
            description,
        }
    }
}

#[async_trait]
impl Tool for ScanTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn source(&self) -> Option<&str> {
        Some(&self.source)
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "componentName": {
                    "type": "string",
                    "description": "Component name as shown on the site, e.g. \"3D Pin\""
                },
                "componentURL": {
                    "type": "string",
                    "description": "Component page or registry URL, used when the name is not in the registry"
                }
            },
            "required": ["componentName"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let name = required_str(&params, "componentName")?;
        let url = params.get("componentURL").and_then(Value::as_str);

        let outcome = ctx.harvester().scan(&self.source, name, url).await?;
        Ok(json!({
            "text": outcome.message(),
            "id": outcome.id,
            "component": outcome.info,
            "payloadPath": outcome.payload_path.display().to_string(),
            "placeholderContent": outcome.placeholder_content,
        }))
    }
}

/// `get_<source>_component_prompt`: integration instructions for a
/// harvested component.
pub struct PromptTool {
    source: String,
    name: String,
    description: String,
}

impl PromptTool {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            name: format!("get_{}_component_prompt", source),
            description: format!(
                "Get step-by-step integration instructions for a scanned {} component",
                source
            ),
        }
    }
}

#[async_trait]
impl Tool for PromptTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn source(&self) -> Option<&str> {
        Some(&self.source)
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "componentName": {
                    "type": "string",
                    "description": "Name of a component previously scanned from this source"
                }
            },
            "required": ["componentName"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let name = required_str(&params, "componentName")?;
        let prompt = ctx.harvester().prompt(&self.source, name)?;
        Ok(json!({ "text": prompt }))
    }
}

/// `list_<source>_components`: the metadata registry, straight from cache.
pub struct ListRegistryTool {
    source: String,
    name: String,
    description: String,
}

impl ListRegistryTool {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            name: format!("list_{}_components", source),
            description: format!("List every component published in the {} registry", source),
        }
    }
}

#[async_trait]
impl Tool for ListRegistryTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn source(&self) -> Option<&str> {
        Some(&self.source)
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let entries = ctx.harvester().list_registry(&self.source)?;
        Ok(json!({
            "text": format_registry(&self.source, &entries),
            "components": entries,
        }))
    }
}

/// `list_harvested_components`: what the index holds.
pub struct ListHarvestedTool;

#[async_trait]
impl Tool for ListHarvestedTool {
    fn name(&self) -> &str {
        "list_harvested_components"
    }

    fn description(&self) -> &str {
        "List components that have been scanned and stored locally"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Only this source, or \"all\"",
                    "default": "all"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let filter = SourceFilter::parse(params.get("source").and_then(Value::as_str));
        let records = ctx.harvester().list_harvested(&filter)?;
        let components: Map<String, Value> = records
            .iter()
            .map(|(id, info)| Ok((id.clone(), serde_json::to_value(info)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        Ok(json!({
            "text": format_harvested(&records),
            "components": components,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// The tools exposed by the transports.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Tools for every source the harvester was configured with.
    pub fn for_sources(harvester: &Harvester) -> Self {
        let mut registry = Self::new();
        for cache in harvester.caches() {
            let source = cache.source();
            registry.register(Box::new(ScanTool::new(source, cache.shape())));
            registry.register(Box::new(PromptTool::new(source)));
            if cache.shape() == SourceShape::Inline {
                registry.register(Box::new(ListRegistryTool::new(source)));
            }
        }
        registry.register(Box::new(ListHarvestedTool));
        registry
    }

    /// Register a tool. A later tool with the same name shadows nothing;
    /// [`find`](Self::find) returns the first.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| ToolInfo::of(t.as_ref())).collect()
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Looks up, validates, and executes a tool.
    pub async fn call(&self, name: &str, params: &Value, ctx: &ToolContext) -> Result<Value> {
        let tool = self
            .find(name)
            .ok_or_else(|| HarvestError::not_found(format!("no tool named '{}'", name)))?;
        let params = validate_params(&tool.parameters_schema(), params)?;
        tracing::debug!(tool = name, "executing tool");
        tool.execute(params, ctx).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
