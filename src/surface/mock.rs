//! Recording surface for tests.
//!
//! `MockSurface` performs no native input. It records every primitive call,
//! optionally exposes a DOM snapshot so the grounding index and element
//! actions can be exercised, and can be told to fail captures or to lose its
//! connection. A cloned [`MockHandle`] stays readable after the surface has
//! been moved into a session.
//!
//! ```rust,ignore
//! let surface = MockSurface::new(Resolution::new(1920, 1200));
//! let handle = surface.handle();
//! agent.run("open the menu", Box::new(surface), &cancel).await;
//! assert!(handle.released());
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{InputSurface, MouseButton, OverlayMark, ScrollDirection, StructuredSurface};
use crate::error::SurfaceError;
use crate::grounding::{compute_locator, DomNode, NodeSnapshot};
use crate::keys::KeyInput;
use crate::scaling::Resolution;
use crate::types::{BoundingBox, Point};

/// One primitive invocation, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    MoveTo(Point),
    Click(MouseButton, u32),
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    TypeText(String),
    PressKey(KeyInput),
    Scroll(ScrollDirection, u32),
    Capture,
    CaptureFallback,
    CurrentPosition,
    Navigate(String),
    ClickElement(String, MouseButton, u32),
    HoverElement(String),
    FocusElement(String),
    SelectOption(String, String),
    ScrollIntoView(String),
    WaitForElement(String),
    QueryNodes,
    DrawOverlay(String, usize),
    RemoveOverlay(String),
    Release,
}

#[derive(Debug, Default)]
struct MockState {
    size: Option<Resolution>,
    pointer: Point,
    calls: Vec<SurfaceCall>,
    page: Option<NodeSnapshot>,
    pages: HashMap<String, NodeSnapshot>,
    overlays: HashMap<String, usize>,
    failing_captures: usize,
    failing_fallbacks: usize,
    failing_overlay_removals: usize,
    disconnect_on_call: Option<usize>,
    released: bool,
}

impl MockState {
    fn record(&mut self, call: SurfaceCall) -> Result<(), SurfaceError> {
        self.calls.push(call);
        match self.disconnect_on_call {
            Some(n) if self.calls.len() >= n => {
                Err(SurfaceError::Unavailable("mock surface disconnected".into()))
            }
            _ => Ok(()),
        }
    }

    fn element(&self, locator: &str) -> Result<BoundingBox, SurfaceError> {
        let page = self.page.as_ref().ok_or(SurfaceError::Unsupported("element lookup"))?;
        page.candidates
            .iter()
            .filter_map(|c| Some((page.node(c.node)?, c.bbox?)))
            .find(|(node, _)| compute_locator(node) == locator)
            .map(|(_, bbox)| bbox)
            .ok_or_else(|| SurfaceError::primitive("find element", format!("no node at {}", locator)))
    }
}

/// A page whose body holds one `<button>` per entry, in order.
pub fn button_page(buttons: &[(&str, BoundingBox)]) -> NodeSnapshot {
    let mut page = NodeSnapshot::default();
    let html = page.push(DomNode {
        tag: "html".into(),
        ..Default::default()
    });
    let body = page.push(DomNode {
        tag: "body".into(),
        parent: Some(html),
        ..Default::default()
    });
    for (i, (label, bbox)) in buttons.iter().enumerate() {
        let node = page.push(DomNode {
            tag: "button".into(),
            parent: Some(body),
            position: i + 1,
            text: Some(label.to_string()),
            ..Default::default()
        });
        page.add_candidate(node, Some(*bbox));
    }
    page
}

/// Read access to a [`MockSurface`]'s state after it has been moved.
#[derive(Debug, Clone)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.state().calls.clone()
    }

    pub fn released(&self) -> bool {
        self.state().released
    }

    /// Overlay nodes currently present on the page.
    pub fn overlay_nodes(&self) -> usize {
        self.state().overlays.values().sum()
    }

    pub fn pointer(&self) -> Point {
        self.state().pointer
    }
}

#[derive(Debug, Clone)]
pub struct MockSurface {
    state: Arc<Mutex<MockState>>,
    structured: bool,
}

impl MockSurface {
    /// An unstructured (pixel-only) surface.
    pub fn new(size: Resolution) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                size: Some(size),
                ..Default::default()
            })),
            structured: false,
        }
    }

    /// A structured surface showing `page`.
    pub fn with_page(size: Resolution, page: NodeSnapshot) -> Self {
        let surface = Self::new(size);
        surface.state().page = Some(page);
        Self {
            structured: true,
            ..surface
        }
    }

    /// A surface whose size cannot be read, as if it failed to open.
    pub fn unavailable() -> Self {
        let surface = Self::new(Resolution::new(0, 0));
        surface.state().size = None;
        surface
    }

    /// Registers the page shown after navigating to `url`.
    pub fn route(self, url: &str, page: NodeSnapshot) -> Self {
        self.state().pages.insert(url.to_string(), page);
        self
    }

    /// The next `n` primary captures fail.
    pub fn failing_captures(self, n: usize) -> Self {
        self.state().failing_captures = n;
        self
    }

    /// The next `n` fallback captures fail.
    pub fn failing_fallbacks(self, n: usize) -> Self {
        self.state().failing_fallbacks = n;
        self
    }

    /// The next `n` overlay removals fail and leave the overlay in place.
    pub fn failing_overlay_removals(self, n: usize) -> Self {
        self.state().failing_overlay_removals = n;
        self
    }

    /// The `n`th recorded call (1-based) and every later one report a lost connection.
    pub fn disconnect_on_call(self, n: usize) -> Self {
        self.state().disconnect_on_call = Some(n);
        self
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle(self.state.clone())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn blank_png(size: Resolution) -> Result<Vec<u8>, SurfaceError> {
        let img = image::RgbImage::new(size.width.max(1), size.height.max(1));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .map_err(|e| SurfaceError::primitive("capture", e))?;
        Ok(out.into_inner())
    }
}

#[async_trait]
impl InputSurface for MockSurface {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn physical_size(&mut self) -> Result<Resolution, SurfaceError> {
        self.state()
            .size
            .ok_or_else(|| SurfaceError::Unavailable("mock surface never opened".into()))
    }

    async fn move_to(&mut self, to: Point) -> Result<(), SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::MoveTo(to))?;
        state.pointer = to;
        Ok(())
    }

    async fn click(&mut self, button: MouseButton, count: u32) -> Result<(), SurfaceError> {
        self.state().record(SurfaceCall::Click(button, count))
    }

    async fn button_down(&mut self, button: MouseButton) -> Result<(), SurfaceError> {
        self.state().record(SurfaceCall::ButtonDown(button))
    }

    async fn button_up(&mut self, button: MouseButton) -> Result<(), SurfaceError> {
        self.state().record(SurfaceCall::ButtonUp(button))
    }

    async fn type_text(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.state().record(SurfaceCall::TypeText(text.to_string()))
    }

    async fn press_key(&mut self, key: &KeyInput) -> Result<(), SurfaceError> {
        self.state().record(SurfaceCall::PressKey(key.clone()))
    }

    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> Result<(), SurfaceError> {
        self.state().record(SurfaceCall::Scroll(direction, amount))
    }

    async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError> {
        let size = {
            let mut state = self.state();
            state.record(SurfaceCall::Capture)?;
            if state.failing_captures > 0 {
                state.failing_captures -= 1;
                return Err(SurfaceError::primitive("capture", "mock capture failure"));
            }
            state.size.unwrap_or(Resolution::new(1, 1))
        };
        Self::blank_png(size)
    }

    async fn capture_fallback(&mut self) -> Result<Vec<u8>, SurfaceError> {
        let size = {
            let mut state = self.state();
            state.record(SurfaceCall::CaptureFallback)?;
            if state.failing_fallbacks > 0 {
                state.failing_fallbacks -= 1;
                return Err(SurfaceError::primitive("capture fallback", "mock capture failure"));
            }
            state.size.unwrap_or(Resolution::new(1, 1))
        };
        Self::blank_png(size)
    }

    async fn current_position(&mut self) -> Result<Point, SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::CurrentPosition)?;
        Ok(state.pointer)
    }

    async fn release(&mut self) -> Result<(), SurfaceError> {
        let mut state = self.state();
        state.calls.push(SurfaceCall::Release);
        state.released = true;
        Ok(())
    }

    fn as_structured(&mut self) -> Option<&mut dyn StructuredSurface> {
        if self.structured { Some(self) } else { None }
    }
}

#[async_trait]
impl StructuredSurface for MockSurface {
    async fn query_interactive_nodes(&mut self) -> Result<NodeSnapshot, SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::QueryNodes)?;
        Ok(state.page.clone().unwrap_or_default())
    }

    async fn draw_overlay(&mut self, tag: &str, marks: &[OverlayMark]) -> Result<usize, SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::DrawOverlay(tag.to_string(), marks.len()))?;
        // A box and a number label per mark.
        let injected = marks.len() * 2;
        *state.overlays.entry(tag.to_string()).or_default() += injected;
        Ok(injected)
    }

    async fn remove_overlay(&mut self, tag: &str) -> Result<usize, SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::RemoveOverlay(tag.to_string()))?;
        if state.failing_overlay_removals > 0 {
            state.failing_overlay_removals -= 1;
            return Err(SurfaceError::primitive("remove overlay", "mock removal failure"));
        }
        Ok(state.overlays.remove(tag).unwrap_or(0))
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::Navigate(url.to_string()))?;
        if let Some(page) = state.pages.get(url).cloned() {
            state.page = Some(page);
        }
        state.overlays.clear();
        Ok(())
    }

    async fn click_element(
        &mut self,
        locator: &str,
        button: MouseButton,
        count: u32,
    ) -> Result<Point, SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::ClickElement(locator.to_string(), button, count))?;
        let center = state.element(locator)?.center();
        state.pointer = center;
        Ok(center)
    }

    async fn hover_element(&mut self, locator: &str) -> Result<Point, SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::HoverElement(locator.to_string()))?;
        let center = state.element(locator)?.center();
        state.pointer = center;
        Ok(center)
    }

    async fn focus_element(&mut self, locator: &str) -> Result<(), SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::FocusElement(locator.to_string()))?;
        state.element(locator).map(|_| ())
    }

    async fn select_option(&mut self, locator: &str, label: &str) -> Result<(), SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::SelectOption(locator.to_string(), label.to_string()))?;
        state.element(locator).map(|_| ())
    }

    async fn scroll_into_view(&mut self, locator: &str) -> Result<(), SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::ScrollIntoView(locator.to_string()))?;
        state.element(locator).map(|_| ())
    }

    async fn wait_for_element(&mut self, locator: &str, _timeout: Duration) -> Result<(), SurfaceError> {
        let mut state = self.state();
        state.record(SurfaceCall::WaitForElement(locator.to_string()))?;
        state.element(locator).map(|_| ())
    }
}
