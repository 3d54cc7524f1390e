use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Task,
    Model,
    Observer,
}

/// One unit of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
}

impl Turn {
    pub fn task(text: impl Into<String>) -> Self {
        Self {
            role: Role::Task,
            blocks: vec![ContentBlock::Text(text.into())],
        }
    }

    /// A model turn proposing one action, optionally preceded by the model's own text.
    pub fn proposal(text: Option<String>, action: ActionRequest) -> Self {
        let mut blocks = Vec::with_capacity(2);
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            blocks.push(ContentBlock::Text(text));
        }
        blocks.push(ContentBlock::Action(action));
        Self {
            role: Role::Model,
            blocks,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            blocks: vec![ContentBlock::Text(text.into())],
        }
    }

    pub fn observation(result: ActionResult) -> Self {
        Self {
            role: Role::Observer,
            blocks: vec![ContentBlock::Result(result)],
        }
    }

    pub fn proposed_action(&self) -> Option<&ActionRequest> {
        self.blocks.iter().find_map(|b| match b {
            ContentBlock::Action(a) => Some(a),
            _ => None,
        })
    }

    pub fn action_result(&self) -> Option<&ActionResult> {
        self.blocks.iter().find_map(|b| match b {
            ContentBlock::Result(r) => Some(r),
            _ => None,
        })
    }

    pub fn has_image(&self) -> bool {
        self.blocks.iter().any(|b| match b {
            ContentBlock::Image(_) => true,
            ContentBlock::Result(r) => r.image().is_some(),
            _ => false,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(String),
    Image(ImageData),
    Action(ActionRequest),
    Result(ActionResult),
}

/// Base64-encoded image ready to be embedded in a model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub media_type: String,
    pub data: String,
}

/// A symbolic action proposed by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Call id assigned by the model, echoed back in the matching result.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<(i64, i64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ActionRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.coordinate = Some((x, y));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn on_element(mut self, id: u32) -> Self {
        self.element = Some(id);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Builds a request from a tool-use input object.
    ///
    /// Accepts both the computer-use vocabulary (`coordinate: [x, y]`, key
    /// combos in `text`) and the browser tool's (`element`, `url`, `key`,
    /// `direction`). Unknown or malformed fields are left empty so the
    /// dispatcher can report them as invalid arguments.
    pub fn from_tool_input(id: impl Into<String>, input: &Value) -> Self {
        let name = input
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let coordinate = input
            .get("coordinate")
            .and_then(Value::as_array)
            .filter(|c| c.len() == 2)
            .and_then(|c| Some((c[0].as_i64()?, c[1].as_i64()?)));

        let element = input
            .get("element")
            .or_else(|| input.get("index"))
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());

        let text = ["text", "url", "value", "direction", "duration_ms"]
            .iter()
            .find_map(|k| match input.get(*k)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        let key = input
            .get("key")
            .and_then(Value::as_str)
            .map(String::from);

        Self {
            id: id.into(),
            name,
            element,
            text,
            coordinate,
            key,
        }
    }
}

/// The coarse category of an action result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Ok,
    Screenshot,
    CursorPosition,
    Error,
}

/// Image slot of a screenshot result; older captures are elided to save space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Attachment {
    Inline(ImageData),
    Elided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Ok {
        message: String,
    },
    Screenshot {
        image: Attachment,
        path: Option<String>,
        /// Element listing from the grounding pass, structured surfaces only.
        elements: Option<String>,
    },
    CursorPosition {
        x: i64,
        y: i64,
    },
    Error {
        error: ErrorKind,
        message: String,
    },
}

/// The observed result of one dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub call_id: String,
    pub outcome: Outcome,
}

impl ActionResult {
    pub fn ok(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: Outcome::Ok {
                message: message.into(),
            },
        }
    }

    pub fn failed(call_id: impl Into<String>, error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: Outcome::Error {
                error,
                message: message.into(),
            },
        }
    }

    pub fn kind(&self) -> ResultKind {
        match self.outcome {
            Outcome::Ok { .. } => ResultKind::Ok,
            Outcome::Screenshot { .. } => ResultKind::Screenshot,
            Outcome::CursorPosition { .. } => ResultKind::CursorPosition,
            Outcome::Error { .. } => ResultKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind() == ResultKind::Error
    }

    pub fn image(&self) -> Option<&ImageData> {
        match &self.outcome {
            Outcome::Screenshot {
                image: Attachment::Inline(img),
                ..
            } => Some(img),
            _ => None,
        }
    }

    /// Short human-readable summary, used in logs and progress events.
    pub fn summary(&self) -> String {
        match &self.outcome {
            Outcome::Ok { message } => message.clone(),
            Outcome::Screenshot { path, .. } => match path {
                Some(p) => format!("screenshot saved to {}", p),
                None => "screenshot captured".to_string(),
            },
            Outcome::CursorPosition { x, y } => format!("cursor at ({}, {})", x, y),
            Outcome::Error { error, message } => format!("{:?}: {}", error, message),
        }
    }
}

/// Axis-aligned box in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Key used for de-duplication: every edge rounded to whole pixels.
    pub fn rounded(&self) -> (i64, i64, i64, i64) {
        (
            self.x.round() as i64,
            self.y.round() as i64,
            self.width.round() as i64,
            self.height.round() as i64,
        )
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.x + self.width / 2.0).round() as i64,
            y: (self.y + self.height / 2.0).round() as i64,
        }
    }
}

/// Integer pixel position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// An entry of the grounding index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: u32,
    pub tag: String,
    pub locator: String,
    pub label: String,
    pub bbox: BoundingBox,
}

pub const DEFAULT_MAX_STEPS: usize = 25;
pub const DEFAULT_MAX_TURNS: usize = 40;
pub const DEFAULT_KEEP_IMAGES: usize = 1;
pub const ELIDED_IMAGE_PLACEHOLDER: &str = "[earlier screenshot omitted]";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_computer_tool_input() {
        let req = ActionRequest::from_tool_input(
            "toolu_1",
            &json!({"action": "mouse_move", "coordinate": [640, 400]}),
        );
        assert_eq!(req.name, "mouse_move");
        assert_eq!(req.coordinate, Some((640, 400)));
        assert_eq!(req.element, None);
    }

    #[test]
    fn parses_browser_tool_input() {
        let req = ActionRequest::from_tool_input(
            "toolu_2",
            &json!({"action": "navigate", "url": "https://example.com"}),
        );
        assert_eq!(req.text.as_deref(), Some("https://example.com"));

        let req = ActionRequest::from_tool_input(
            "toolu_3",
            &json!({"action": "select", "element": 4, "value": "Blue"}),
        );
        assert_eq!(req.element, Some(4));
        assert_eq!(req.text.as_deref(), Some("Blue"));
    }

    #[test]
    fn malformed_coordinate_is_dropped() {
        let req = ActionRequest::from_tool_input(
            "toolu_4",
            &json!({"action": "mouse_move", "coordinate": [640]}),
        );
        assert_eq!(req.coordinate, None);
    }

    #[test]
    fn rounded_box_and_center() {
        let b = BoundingBox {
            x: 10.4,
            y: 19.6,
            width: 99.5,
            height: 20.2,
        };
        assert_eq!(b.rounded(), (10, 20, 100, 20));
        assert_eq!(b.center(), Point::new(60, 30));
    }
}
