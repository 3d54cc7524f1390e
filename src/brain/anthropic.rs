use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{ModelClient, ModelReply, ModelRequest};
use crate::config::ModelConfig;
use crate::types::{ActionRequest, ActionResult, Attachment, ContentBlock, Outcome, Role, Turn, ELIDED_IMAGE_PLACEHOLDER};

const API_VERSION: &str = "2023-06-01";
const COMPUTER_USE_BETA: &str = "computer-use-2024-10-22";

/// Actions that only exist on the browser tool.
const BROWSER_ACTIONS: &[&str] = &["select", "hover", "scroll", "navigate", "press_key", "wait"];

/// Messages API client exposing the computer-use tool, plus a browser tool
/// for element-indexed actions on structured surfaces.
pub struct AnthropicClient {
    client: Client,
    config: ModelConfig,
}

impl AnthropicClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!("ANTHROPIC_API_KEY not set in environment"));
        }
        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    fn tools(request: &ModelRequest) -> Vec<Value> {
        let mut tools = vec![json!({
            "type": "computer_20241022",
            "name": "computer",
            "display_width_px": request.display.width,
            "display_height_px": request.display.height,
            "display_number": 1,
        })];
        if request.structured {
            tools.push(browser_tool());
        }
        tools
    }
}

fn browser_tool() -> Value {
    json!({
        "name": "browser",
        "description": "Act on the browser page by element id. Ids come from the numbered list returned with the latest screenshot and expire when the page changes.",
        "input_schema": {
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["click", "double_click", "right_click", "type", "select", "hover", "scroll", "navigate", "press_key", "wait"]
                },
                "element": { "type": "integer", "description": "Element id from the latest screenshot" },
                "text": { "type": "string", "description": "Text to type" },
                "value": { "type": "string", "description": "Option label to select" },
                "url": { "type": "string", "description": "URL to open" },
                "direction": { "type": "string", "enum": ["up", "down", "left", "right"] },
                "key": { "type": "string", "description": "Key or combo such as Enter or ctrl+a" },
                "duration_ms": { "type": "integer", "description": "Milliseconds to wait when no element is given" }
            },
            "required": ["action"]
        }
    })
}

/// Which tool an action is replayed under in the history.
fn tool_for(action: &ActionRequest) -> &'static str {
    if action.element.is_some() || BROWSER_ACTIONS.contains(&action.name.as_str()) {
        "browser"
    } else {
        "computer"
    }
}

fn tool_input(action: &ActionRequest) -> Value {
    let mut input = json!({ "action": action.name });
    if let Some((x, y)) = action.coordinate {
        input["coordinate"] = json!([x, y]);
    }
    if let Some(id) = action.element {
        input["element"] = json!(id);
    }
    if let Some(key) = &action.key {
        input["key"] = json!(key);
    }
    if let Some(text) = &action.text {
        let field = match (tool_for(action), action.name.as_str()) {
            ("browser", "navigate") => "url",
            ("browser", "select") => "value",
            ("browser", "scroll") => "direction",
            ("browser", "wait") => "duration_ms",
            _ => "text",
        };
        input[field] = match (field, text.parse::<u64>()) {
            ("duration_ms", Ok(ms)) => json!(ms),
            _ => json!(text),
        };
    }
    input
}

fn result_block(result: &ActionResult) -> Value {
    let mut content = Vec::new();
    match &result.outcome {
        Outcome::Screenshot { image, elements, .. } => {
            match image {
                Attachment::Inline(img) => content.push(json!({
                    "type": "image",
                    "source": { "type": "base64", "media_type": img.media_type, "data": img.data },
                })),
                Attachment::Elided => content.push(json!({ "type": "text", "text": ELIDED_IMAGE_PLACEHOLDER })),
            }
            if let Some(listing) = elements {
                content.push(json!({ "type": "text", "text": format!("Interactive elements:\n{}", listing) }));
            }
        }
        _ => content.push(json!({ "type": "text", "text": result.summary() })),
    }
    json!({
        "type": "tool_result",
        "tool_use_id": result.call_id,
        "is_error": result.is_error(),
        "content": content,
    })
}

fn block_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text(text) => json!({ "type": "text", "text": text }),
        ContentBlock::Image(img) => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": img.media_type, "data": img.data },
        }),
        ContentBlock::Action(action) => json!({
            "type": "tool_use",
            "id": action.id,
            "name": tool_for(action),
            "input": tool_input(action),
        }),
        ContentBlock::Result(result) => result_block(result),
    }
}

/// Converts the turn history to API messages. Consecutive turns of the same
/// API role are merged, since the API requires alternating roles.
pub fn to_messages(turns: &[Turn]) -> Vec<Value> {
    let mut messages: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for turn in turns {
        let role = match turn.role {
            Role::Model => "assistant",
            Role::Task | Role::Observer => "user",
        };
        let blocks = turn.blocks.iter().map(block_json);
        match messages.last_mut() {
            Some((last_role, content)) if *last_role == role => content.extend(blocks),
            _ => messages.push((role, blocks.collect())),
        }
    }
    messages
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect()
}

/// Reads text and tool calls out of a Messages API response body.
pub fn parse_reply(body: &Value) -> Result<ModelReply> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| anyhow!("No content in model response: {}", body))?;

    let mut texts = Vec::new();
    let mut actions = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    texts.push(t.to_string());
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default();
                actions.push(ActionRequest::from_tool_input(id, &block["input"]));
            }
            other => debug!("Ignoring content block of type {:?}", other),
        }
    }

    let text = Some(texts.join("\n")).filter(|t| !t.trim().is_empty());
    Ok(ModelReply { text, actions })
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelReply> {
        let messages = to_messages(&request.turns);
        debug!("Sending {} messages to {}", messages.len(), self.config.model);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("anthropic-beta", COMPUTER_USE_BETA)
            .json(&json!({
                "model": self.config.model,
                "max_tokens": self.config.max_tokens,
                "system": request.system,
                "tools": Self::tools(request),
                "messages": messages,
            }))
            .send()
            .await
            .context("sending request to the Messages API")?;

        let status = response.status();
        let body: Value = response.json().await.context("reading model response")?;

        if !status.is_success() {
            let err_msg = body["error"]["message"].as_str().unwrap_or("Unknown API error");
            warn!("Model API error ({}): {}", status, err_msg);
            return Err(anyhow!("Anthropic API error ({}): {}", status, err_msg));
        }

        let reply = parse_reply(&body)?;
        info!(
            "Model replied with {} action(s){}",
            reply.actions.len(),
            if reply.text.is_some() { " and text" } else { "" }
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageData;

    #[test]
    fn history_alternates_roles() {
        let turns = vec![
            Turn::task("open settings"),
            Turn::model_text("Looking first."),
            Turn::proposal(None, ActionRequest::new("t1", "screenshot")),
            Turn::observation(ActionResult {
                call_id: "t1".into(),
                outcome: Outcome::Screenshot {
                    image: Attachment::Inline(ImageData {
                        media_type: "image/png".into(),
                        data: "AAAA".into(),
                    }),
                    path: None,
                    elements: Some("[1] <button> \"Settings\"".into()),
                },
            }),
            Turn::proposal(None, ActionRequest::new("t2", "click").on_element(1)),
            Turn::observation(ActionResult::ok("t2", "clicked element 1")),
        ];

        let messages = to_messages(&turns);
        let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant", "user"]);

        assert_eq!(messages[1]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[1]["content"][1]["name"], "computer");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "t1");
        assert_eq!(messages[2]["content"][0]["content"][0]["type"], "image");
        assert_eq!(messages[3]["content"][0]["name"], "browser");
        assert_eq!(messages[3]["content"][0]["input"]["element"], 1);
    }

    #[test]
    fn browser_fields_are_restored() {
        let nav = ActionRequest::new("t", "navigate").with_text("https://example.com");
        assert_eq!(tool_input(&nav)["url"], "https://example.com");
        let wait = ActionRequest::new("t", "wait").with_text("500");
        assert_eq!(tool_input(&wait)["duration_ms"], 500);
        let key = ActionRequest::new("t", "key").with_text("ctrl+l");
        assert_eq!(tool_input(&key)["text"], "ctrl+l");
    }

    #[test]
    fn parses_text_and_tool_calls() {
        let body = json!({
            "content": [
                { "type": "text", "text": "Moving to the menu." },
                { "type": "tool_use", "id": "toolu_1", "name": "computer",
                  "input": { "action": "mouse_move", "coordinate": [10, 20] } },
                { "type": "tool_use", "id": "toolu_2", "name": "computer",
                  "input": { "action": "left_click" } }
            ],
            "stop_reason": "tool_use"
        });

        let reply = parse_reply(&body).unwrap();
        assert_eq!(reply.text.as_deref(), Some("Moving to the menu."));
        assert_eq!(reply.actions.len(), 2);
        assert_eq!(reply.actions[0].coordinate, Some((10, 20)));
        assert_eq!(reply.actions[1].id, "toolu_2");
    }

    #[test]
    fn final_answer_has_no_actions() {
        let body = json!({ "content": [{ "type": "text", "text": "Done: the price is $12." }] });
        let reply = parse_reply(&body).unwrap();
        assert!(reply.actions.is_empty());
        assert_eq!(reply.text.as_deref(), Some("Done: the price is $12."));
    }
}
