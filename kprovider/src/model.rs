//! Provider-agnostic request, response, and turn model types.
//!
//! ```rust
//! use kprovider::{Augmentation, GatewayErrorKind, InferenceRequest, ReasoningEffort, Turn};
//!
//! let ok = InferenceRequest::builder()
//!     .turn(Turn::user("What is BAföG?"))
//!     .persona_prompt("You explain student aid.")
//!     .augmentation(Augmentation::CodeExecution)
//!     .reasoning_effort(ReasoningEffort::High)
//!     .build();
//! assert!(ok.is_ok());
//!
//! let err = InferenceRequest::builder().build().err().expect("no turns should fail");
//! assert_eq!(err.kind, GatewayErrorKind::InvalidRequest);
//! ```

use std::fmt::{Display, Formatter};

use kcommon::SamplingParams;

use crate::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message of a conversation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Coarse directive controlling how much the model deliberates before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Display for ReasoningEffort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-side system tool attached to a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Augmentation {
    CodeExecution,
    WebSearch,
}

impl Augmentation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeExecution => "code_execution",
            Self::WebSearch => "web_search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResultContent {
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultBlock {
    pub tool_use_id: Option<String>,
    pub content: Vec<ToolResultContent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    ContentFiltered,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResponse {
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl InferenceResponse {
    pub fn from_text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: vec![ContentBlock::Text(text.into())],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    /// Concatenates every textual payload in block order, one part per line.
    pub fn extract_text(&self) -> String {
        extract_text(self)
    }
}

/// Pulls plain text out of a response: text blocks, tool-result text items, and the
/// `stdOut` field of JSON tool results. Returns an empty string when nothing matches.
pub fn extract_text(response: &InferenceResponse) -> String {
    let mut parts = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Text(text) => parts.push(text.as_str()),
            ContentBlock::ToolResult(result) => {
                for item in &result.content {
                    match item {
                        ToolResultContent::Text(text) => parts.push(text.as_str()),
                        ToolResultContent::Json(value) => {
                            if let Some(stdout) = value.get("stdOut").and_then(|v| v.as_str())
                                && !stdout.is_empty()
                            {
                                parts.push(stdout);
                            }
                        }
                    }
                }
            }
        }
    }

    parts.join("\n")
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Overrides the gateway's configured model id when set.
    pub model: Option<String>,
    pub turns: Vec<Turn>,
    pub persona_prompt: Option<String>,
    pub augmentation: Option<Augmentation>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub sampling: SamplingParams,
}

impl InferenceRequest {
    pub fn builder() -> InferenceRequestBuilder {
        InferenceRequestBuilder::new()
    }

    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            model: None,
            turns,
            persona_prompt: None,
            augmentation: None,
            reasoning_effort: None,
            sampling: SamplingParams::default(),
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            return Err(GatewayError::invalid_request("model must not be blank"));
        }

        if self.turns.is_empty() {
            return Err(GatewayError::invalid_request("at least one turn is required"));
        }

        if self.sampling.max_tokens == 0 {
            return Err(GatewayError::invalid_request(
                "max_tokens must be greater than zero",
            ));
        }

        if !(0.0..=1.0).contains(&self.sampling.temperature) {
            return Err(GatewayError::invalid_request(
                "temperature must be in the inclusive range 0.0..=1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.sampling.top_p) {
            return Err(GatewayError::invalid_request(
                "top_p must be in the inclusive range 0.0..=1.0",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequestBuilder {
    model: Option<String>,
    turns: Vec<Turn>,
    persona_prompt: Option<String>,
    augmentation: Option<Augmentation>,
    reasoning_effort: Option<ReasoningEffort>,
    sampling: SamplingParams,
}

impl Default for InferenceRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceRequestBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            turns: Vec::new(),
            persona_prompt: None,
            augmentation: None,
            reasoning_effort: None,
            sampling: SamplingParams::default(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn turn(mut self, turn: Turn) -> Self {
        self.turns.push(turn);
        self
    }

    pub fn turns(mut self, turns: impl IntoIterator<Item = Turn>) -> Self {
        self.turns.extend(turns);
        self
    }

    pub fn persona_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.persona_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    pub fn augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = Some(augmentation);
        self
    }

    pub fn maybe_augmentation(mut self, augmentation: Option<Augmentation>) -> Self {
        self.augmentation = augmentation;
        self
    }

    pub fn reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.sampling.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.sampling.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.sampling.top_p = top_p;
        self
    }

    pub fn build(self) -> Result<InferenceRequest, GatewayError> {
        let request = InferenceRequest {
            model: self.model,
            turns: self.turns,
            persona_prompt: self.persona_prompt,
            augmentation: self.augmentation,
            reasoning_effort: self.reasoning_effort,
            sampling: self.sampling,
        };

        request.validate()?;
        Ok(request)
    }
}
