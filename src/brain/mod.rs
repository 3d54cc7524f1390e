//! The model side of the loop.

pub mod anthropic;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

use crate::scaling::Resolution;
use crate::types::{ActionRequest, Turn};

pub use anthropic::AnthropicClient;
pub use mock::ScriptedModel;

pub const SYSTEM_PROMPT: &str = r#"You control a computer through the tools provided. Work one step at a time.

Rules:
1. Start by taking a screenshot so you know what is on screen.
2. All coordinates refer to the display size declared in the computer tool.
3. After any action that changes the screen, take a new screenshot before relying on what you saw earlier.
4. If an action fails, read the error and try a different approach instead of repeating it.
5. When the task is done, reply with a short summary and no tool calls."#;

const STRUCTURED_RULES: &str = r#"
6. Screenshots of the browser come with a numbered list of interactive elements, also drawn on the image.
   Prefer the browser tool with an element id over raw coordinates.
7. Element ids are only valid until the page changes. Clicking, typing, selecting or navigating makes them stale; take a screenshot to get fresh ids."#;

/// System prompt for a surface, with the element-id rules on structured ones.
pub fn system_prompt(structured: bool) -> String {
    if structured {
        format!("{}{}", SYSTEM_PROMPT, STRUCTURED_RULES)
    } else {
        SYSTEM_PROMPT.to_string()
    }
}

/// What the model is shown each iteration.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    /// Logical display size, the only coordinate space the model sees.
    pub display: Resolution,
    /// Whether element-indexed actions are available.
    pub structured: bool,
    pub actions: Vec<String>,
}

/// One model turn: optional text and zero or more proposed actions, in order.
/// No actions means the model considers the task finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub actions: Vec<ActionRequest>,
}

impl ModelReply {
    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            actions: Vec::new(),
        }
    }

    pub fn act(actions: Vec<ActionRequest>) -> Self {
        Self { text: None, actions }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelReply>;
}
