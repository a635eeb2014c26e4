//! Tool System
//!
//! Tool descriptors, call/result types, the invoker seam toward remote tool
//! servers, and parsing of tool-call requests out of reasoning output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Tool call request parsed from a reasoning step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(rename = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,

    /// Call ID for tracking announcements against results
    #[serde(default)]
    pub id: Option<String>,
}

/// Result from tool execution, as seen by the reasoning step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (result text or failure description)
    pub output: String,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// Render for injection into the conversation
    pub fn as_message_text(&self) -> String {
        if self.success {
            format!("[Tool '{}' returned]\n{}", self.name, self.output)
        } else {
            format!("[Tool '{}' failed]\n{}", self.name, self.output)
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Metadata describing an invocable capability, surfaced to the reasoning step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the reasoning step)
    pub description: String,

    /// Parameter definitions
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,

    /// Roles allowed to invoke this tool; empty = any authenticated principal
    #[serde(default)]
    pub required_roles: Vec<String>,

    /// Audience of the server owning this tool
    #[serde(default)]
    pub audience: String,
}

impl ToolDescriptor {
    /// Validate that all required parameters are present in a call
    pub fn validate_arguments(&self, call: &ToolCall) -> std::result::Result<(), String> {
        for param in &self.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(format!("Missing required parameter: {}", param.name));
            }
        }
        Ok(())
    }
}

/// Seam toward the tool servers: discovery plus authenticated invocation.
///
/// `invoke` classifies failures into unsuccessful [`ToolResult`]s rather than
/// errors: the reasoning step must see tool failures as ordinary results and
/// react to them. `Err` is reserved for faults in the invoker itself.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Query every configured tool server for its exposed tools
    async fn discover(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a tool on its owning server
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult>;
}

/// Generate a system prompt section describing the available tools
pub fn toolset_prompt_section(descriptors: &[ToolDescriptor]) -> String {
    let mut prompt = String::from("## Available Tools\n\n");
    prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
    prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");
    prompt.push_str("You may request several tools in one response by emitting several blocks.\n\n");

    for descriptor in descriptors {
        prompt.push_str(&format!("### {}\n", descriptor.name));
        prompt.push_str(&format!("{}\n", descriptor.description));

        if descriptor.required_roles.is_empty() {
            prompt.push_str("**Permissible roles:** any\n");
        } else {
            prompt.push_str(&format!(
                "**Permissible roles:** {}\n",
                descriptor.required_roles.join(", ")
            ));
        }

        if !descriptor.parameters.is_empty() {
            prompt.push_str("**Parameters:**\n");
            for param in &descriptor.parameters {
                let required = if param.required { " (required)" } else { "" };
                prompt.push_str(&format!(
                    "- `{}` ({}){}: {}\n",
                    param.name, param.param_type, required, param.description
                ));
            }
        }
        prompt.push('\n');
    }

    prompt
}

/// Parse every tool-call request out of a reasoning completion.
///
/// A completion may carry several fenced ```tool blocks (a batch). When no
/// fenced block is present, a single inline JSON object with a "tool" key is
/// accepted as a fallback.
pub fn parse_tool_calls(content: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut rest = content;

    while let Some(start_idx) = rest.find("```tool") {
        let after_marker = &rest[start_idx + "```tool".len()..];
        let Some(end_idx) = after_marker.find("```") else {
            break;
        };
        let json_str = after_marker[..end_idx].trim();

        if let Ok(mut call) = serde_json::from_str::<ToolCall>(json_str) {
            if call.id.is_none() {
                call.id = Some(uuid::Uuid::new_v4().to_string());
            }
            calls.push(call);
        }

        rest = &after_marker[end_idx + "```".len()..];
    }

    if calls.is_empty() {
        if let Some(mut call) = parse_inline_tool_call(content) {
            if call.id.is_none() {
                call.id = Some(uuid::Uuid::new_v4().to_string());
            }
            calls.push(call);
        }
    }

    calls
}

/// Try to parse a bare inline JSON tool call
fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
    if !content.contains(r#""tool""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;

    if end <= start {
        return None;
    }

    serde_json::from_str::<ToolCall>(&content[start..=end]).ok()
}

/// Strip fenced tool blocks from a completion, leaving the surrounding prose
pub fn strip_tool_blocks(content: &str) -> String {
    let mut out = String::new();
    let mut rest = content;

    while let Some(start_idx) = rest.find("```tool") {
        out.push_str(&rest[..start_idx]);
        let after_marker = &rest[start_idx + "```tool".len()..];
        match after_marker.find("```") {
            Some(end_idx) => rest = &after_marker[end_idx + "```".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}
