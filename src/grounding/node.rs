//! Engine-independent view of document nodes, and the pure functions that
//! derive a structural locator and a display label from it.

use serde::{Deserialize, Serialize};

use crate::types::BoundingBox;

/// Longest label shown to the model for one element.
pub const LABEL_MAX_CHARS: usize = 80;

/// How a node behaves when labelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Input,
    TextArea,
    Select,
    #[default]
    Other,
}

/// Read-only access to a node of some document tree.
pub trait NodeView: Clone {
    /// Lower-case tag name.
    fn tag_name(&self) -> &str;
    fn parent(&self) -> Option<Self>;
    /// 1-based position among element siblings with the same tag.
    fn same_tag_position(&self) -> usize;
    fn control(&self) -> Control;
    fn value(&self) -> Option<&str>;
    fn placeholder(&self) -> Option<&str>;
    fn input_type(&self) -> Option<&str>;
    fn selected_text(&self) -> Option<&str>;
    fn text_content(&self) -> Option<&str>;
}

/// Root-relative path of `tag[position]` steps, anchored at `/html/body`
/// when the node lives in the body.
pub fn compute_locator<N: NodeView>(node: &N) -> String {
    let mut steps = Vec::new();
    let mut current = Some(node.clone());
    let mut anchor = String::new();

    while let Some(n) = current {
        if n.tag_name() == "body" {
            anchor = "/html/body".to_string();
            break;
        }
        match n.parent() {
            Some(parent) => {
                steps.push(format!("{}[{}]", n.tag_name(), n.same_tag_position()));
                current = Some(parent);
            }
            None => {
                anchor = format!("/{}", n.tag_name());
                break;
            }
        }
    }

    steps.reverse();
    let mut locator = anchor;
    for step in steps {
        locator.push('/');
        locator.push_str(&step);
    }
    locator
}

/// What the model sees next to an element id.
pub fn compute_label<N: NodeView>(node: &N) -> String {
    let raw = match node.control() {
        Control::Input => first_present(&[node.value(), node.placeholder(), node.input_type()]),
        Control::TextArea => first_present(&[node.value(), node.placeholder()]),
        Control::Select => node.selected_text().unwrap_or_default(),
        Control::Other => node.text_content().unwrap_or_default(),
    };
    truncate(&collapse_whitespace(raw), LABEL_MAX_CHARS)
}

fn first_present<'a>(candidates: &[Option<&'a str>]) -> &'a str {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

/// One node as reported by a structured surface. Only interactive candidates
/// carry label fields; their ancestors carry just the tree structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomNode {
    pub tag: String,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default = "first_position")]
    pub position: usize,
    #[serde(default)]
    pub control: Control,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub selected_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

fn first_position() -> usize {
    1
}

/// An interactive node found by the surface, with its box if it has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub node: usize,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

/// Flat tree of nodes plus the interactive candidates, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub nodes: Vec<DomNode>,
    pub candidates: Vec<Candidate>,
}

impl NodeSnapshot {
    pub fn node(&self, index: usize) -> Option<NodeRef<'_>> {
        (index < self.nodes.len()).then_some(NodeRef {
            snapshot: self,
            index,
        })
    }

    /// Appends a node and returns its index.
    pub fn push(&mut self, node: DomNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_candidate(&mut self, node: usize, bbox: Option<BoundingBox>) {
        self.candidates.push(Candidate { node, bbox });
    }
}

/// Cursor into a [`NodeSnapshot`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    snapshot: &'a NodeSnapshot,
    index: usize,
}

impl<'a> NodeRef<'a> {
    fn data(&self) -> &'a DomNode {
        &self.snapshot.nodes[self.index]
    }
}

impl NodeView for NodeRef<'_> {
    fn tag_name(&self) -> &str {
        &self.data().tag
    }

    fn parent(&self) -> Option<Self> {
        // A parent index that does not precede the node would allow cycles.
        self.data()
            .parent
            .filter(|p| *p < self.index)
            .and_then(|p| self.snapshot.node(p))
    }

    fn same_tag_position(&self) -> usize {
        self.data().position
    }

    fn control(&self) -> Control {
        self.data().control
    }

    fn value(&self) -> Option<&str> {
        self.data().value.as_deref()
    }

    fn placeholder(&self) -> Option<&str> {
        self.data().placeholder.as_deref()
    }

    fn input_type(&self) -> Option<&str> {
        self.data().input_type.as_deref()
    }

    fn selected_text(&self) -> Option<&str> {
        self.data().selected_text.as_deref()
    }

    fn text_content(&self) -> Option<&str> {
        self.data().text.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, parent: usize, position: usize) -> DomNode {
        DomNode {
            tag: tag.into(),
            parent: Some(parent),
            position,
            ..Default::default()
        }
    }

    fn page() -> NodeSnapshot {
        let mut s = NodeSnapshot::default();
        let html = s.push(DomNode {
            tag: "html".into(),
            ..Default::default()
        });
        let body = s.push(element("body", html, 1));
        let div = s.push(element("div", body, 2));
        s.push(DomNode {
            text: Some("  Sign\n   in  ".into()),
            ..element("button", div, 3)
        });
        s
    }

    #[test]
    fn locator_is_anchored_at_body() {
        let s = page();
        assert_eq!(compute_locator(&s.node(3).unwrap()), "/html/body/div[2]/button[3]");
        assert_eq!(compute_locator(&s.node(1).unwrap()), "/html/body");
    }

    #[test]
    fn locator_outside_body_starts_at_root() {
        let mut s = NodeSnapshot::default();
        let root = s.push(DomNode {
            tag: "svg".into(),
            ..Default::default()
        });
        let g = s.push(element("g", root, 1));
        assert_eq!(compute_locator(&s.node(g).unwrap()), "/svg/g[1]");
    }

    #[test]
    fn label_collapses_text() {
        let s = page();
        assert_eq!(compute_label(&s.node(3).unwrap()), "Sign in");
    }

    #[test]
    fn input_label_prefers_value_then_placeholder_then_type() {
        let mut node = DomNode {
            tag: "input".into(),
            control: Control::Input,
            input_type: Some("email".into()),
            placeholder: Some("you@example.com".into()),
            ..Default::default()
        };
        let mut s = NodeSnapshot::default();
        s.push(node.clone());
        assert_eq!(compute_label(&s.node(0).unwrap()), "you@example.com");

        node.value = Some("me@example.com".into());
        s.nodes[0] = node.clone();
        assert_eq!(compute_label(&s.node(0).unwrap()), "me@example.com");

        node.value = Some(String::new());
        node.placeholder = None;
        s.nodes[0] = node;
        assert_eq!(compute_label(&s.node(0).unwrap()), "email");
    }

    #[test]
    fn select_label_is_selected_option() {
        let mut s = NodeSnapshot::default();
        s.push(DomNode {
            tag: "select".into(),
            control: Control::Select,
            selected_text: Some("Blue".into()),
            text: Some("Red Green Blue".into()),
            ..Default::default()
        });
        assert_eq!(compute_label(&s.node(0).unwrap()), "Blue");
    }

    #[test]
    fn long_labels_are_truncated() {
        let mut s = NodeSnapshot::default();
        s.push(DomNode {
            tag: "a".into(),
            text: Some("x".repeat(200)),
            ..Default::default()
        });
        let label = compute_label(&s.node(0).unwrap());
        assert_eq!(label.chars().count(), LABEL_MAX_CHARS + 1);
        assert!(label.ends_with('…'));
    }
}
