//! Converse wire shapes and their conversion into the provider-agnostic model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Augmentation, ContentBlock, InferenceResponse, ReasoningEffort, Role, StopReason, TokenUsage,
    ToolResultBlock, ToolResultContent, Turn,
};

pub(crate) const CODE_INTERPRETER_TOOL: &str = "nova_code_interpreter";
pub(crate) const WEB_GROUNDING_TOOL: &str = "nova_grounding";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    #[serde(skip)]
    pub model_id: String,
    pub messages: Vec<ConverseMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<ConverseContent>,
    pub inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_model_request_fields: Option<AdditionalModelRequestFields>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverseRole {
    User,
    Assistant,
}

impl From<Role> for ConverseRole {
    fn from(value: Role) -> Self {
        match value {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConverseContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConverseMessage {
    pub role: ConverseRole,
    pub content: Vec<ConverseContent>,
}

impl From<Turn> for ConverseMessage {
    fn from(value: Turn) -> Self {
        Self {
            role: value.role.into(),
            content: vec![ConverseContent { text: value.text }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolConfig {
    pub tools: Vec<ToolSpec>,
}

impl ToolConfig {
    pub fn for_augmentation(augmentation: Augmentation) -> Self {
        let name = match augmentation {
            Augmentation::CodeExecution => CODE_INTERPRETER_TOOL,
            Augmentation::WebSearch => WEB_GROUNDING_TOOL,
        };

        Self {
            tools: vec![ToolSpec {
                system_tool: SystemTool {
                    name: name.to_string(),
                },
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub system_tool: SystemTool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemTool {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalModelRequestFields {
    pub reasoning_config: ReasoningConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub max_reasoning_effort: String,
}

impl From<ReasoningEffort> for AdditionalModelRequestFields {
    fn from(value: ReasoningEffort) -> Self {
        Self {
            reasoning_config: ReasoningConfig {
                kind: "enabled".to_string(),
                max_reasoning_effort: value.as_str().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    #[serde(default)]
    pub output: ConverseOutput,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<ConverseUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverseOutput {
    #[serde(default)]
    pub message: Option<ConverseOutputMessage>,
}

/// Content blocks stay as raw JSON; block shapes this crate does not model
/// (tool use requests, reasoning traces, citations) are skipped on conversion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverseOutputMessage {
    #[serde(default)]
    pub content: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl From<ConverseUsage> for TokenUsage {
    fn from(value: ConverseUsage) -> Self {
        Self {
            input_tokens: value.input_tokens,
            output_tokens: value.output_tokens,
            total_tokens: value.total_tokens,
        }
    }
}

impl ConverseResponse {
    pub fn into_inference_response(self, model: String) -> InferenceResponse {
        let content = self
            .output
            .message
            .map(|message| message.content)
            .unwrap_or_default()
            .iter()
            .filter_map(content_block_from_value)
            .collect();

        InferenceResponse {
            model,
            content,
            stop_reason: parse_stop_reason(self.stop_reason.as_deref()),
            usage: self.usage.map(TokenUsage::from).unwrap_or_default(),
        }
    }
}

/// Incremental pieces decoded from the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverseStreamChunk {
    TextDelta(String),
    MessageStop(StopReason),
    Metadata(TokenUsage),
}

pub(crate) fn content_block_from_value(value: &Value) -> Option<ContentBlock> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return Some(ContentBlock::Text(text.to_string()));
    }

    let result = value.get("toolResult")?;
    let items = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    if let Some(json) = item.get("json") {
                        Some(ToolResultContent::Json(json.clone()))
                    } else {
                        item.get("text")
                            .and_then(Value::as_str)
                            .map(|text| ToolResultContent::Text(text.to_string()))
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ContentBlock::ToolResult(ToolResultBlock {
        tool_use_id: result
            .get("toolUseId")
            .and_then(Value::as_str)
            .map(str::to_string),
        content: items,
    }))
}

pub(crate) fn parse_stop_reason(value: Option<&str>) -> StopReason {
    match value {
        Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("tool_use") => StopReason::ToolUse,
        Some("content_filtered") | Some("guardrail_intervened") => StopReason::ContentFiltered,
        _ => StopReason::Other,
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConverseErrorBody {
    #[serde(default, rename = "__type")]
    pub error_type: Option<String>,
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
}

pub(crate) fn parse_error_body(body: &str) -> ConverseErrorBody {
    serde_json::from_str(body).unwrap_or_default()
}
