//! Pointer, keyboard and capture primitives the agent acts through.

pub mod browser;
pub mod desktop;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::SurfaceError;
use crate::grounding::NodeSnapshot;
use crate::keys::KeyInput;
use crate::scaling::Resolution;
use crate::types::{BoundingBox, Point};

pub use browser::BrowserSurface;
pub use desktop::DesktopSurface;
pub use mock::MockSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            other => Err(format!("invalid scroll direction '{}', use up/down/left/right", other)),
        }
    }
}

/// Numbered box drawn over an indexed element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayMark {
    pub id: u32,
    pub bbox: BoundingBox,
}

/// A surface the agent can point, type and capture on. All coordinates are
/// physical. One instance belongs to exactly one session.
#[async_trait]
pub trait InputSurface: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn physical_size(&mut self) -> Result<Resolution, SurfaceError>;

    async fn move_to(&mut self, to: Point) -> Result<(), SurfaceError>;

    /// Presses and releases `button` `count` times at the current position.
    async fn click(&mut self, button: MouseButton, count: u32) -> Result<(), SurfaceError>;

    async fn button_down(&mut self, button: MouseButton) -> Result<(), SurfaceError>;

    async fn button_up(&mut self, button: MouseButton) -> Result<(), SurfaceError>;

    async fn type_text(&mut self, text: &str) -> Result<(), SurfaceError>;

    async fn press_key(&mut self, key: &KeyInput) -> Result<(), SurfaceError>;

    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> Result<(), SurfaceError>;

    /// PNG bytes of the visible surface.
    async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError>;

    /// Alternate capture path used once when [`capture`](Self::capture) fails.
    async fn capture_fallback(&mut self) -> Result<Vec<u8>, SurfaceError> {
        self.capture().await
    }

    async fn current_position(&mut self) -> Result<Point, SurfaceError>;

    /// Releases the native process or connection. Called once per session.
    async fn release(&mut self) -> Result<(), SurfaceError>;

    /// DOM-addressable operations, when the backend has them.
    fn as_structured(&mut self) -> Option<&mut dyn StructuredSurface> {
        None
    }
}

/// Operations only available on surfaces with an element tree.
/// Elements are addressed by the locators produced by the grounding index.
#[async_trait]
pub trait StructuredSurface: Send + Sync {
    async fn query_interactive_nodes(&mut self) -> Result<NodeSnapshot, SurfaceError>;

    /// Draws the marks tagged with `tag`; returns the number of nodes injected.
    async fn draw_overlay(&mut self, tag: &str, marks: &[OverlayMark]) -> Result<usize, SurfaceError>;

    /// Removes every node injected under `tag`; returns how many were removed.
    async fn remove_overlay(&mut self, tag: &str) -> Result<usize, SurfaceError>;

    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError>;

    /// Clicks the element's midpoint and returns it.
    async fn click_element(
        &mut self,
        locator: &str,
        button: MouseButton,
        count: u32,
    ) -> Result<Point, SurfaceError>;

    async fn hover_element(&mut self, locator: &str) -> Result<Point, SurfaceError>;

    async fn focus_element(&mut self, locator: &str) -> Result<(), SurfaceError>;

    async fn select_option(&mut self, locator: &str, label: &str) -> Result<(), SurfaceError>;

    async fn scroll_into_view(&mut self, locator: &str) -> Result<(), SurfaceError>;

    async fn wait_for_element(&mut self, locator: &str, timeout: Duration) -> Result<(), SurfaceError>;
}
