//! Executes one symbolic action against the input surface.
//!
//! Every action name maps to an [`ActionHandler`] in a [`Dispatcher`]
//! registry. Handlers report recoverable problems as [`ActionError`]s, which
//! the dispatcher turns into failed results for the model. Only a lost
//! surface escapes as an error.

mod capture;
mod keyboard;
mod page;
mod pointer;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::artifacts::ArtifactStore;
use crate::error::{ActionError, ErrorKind, SurfaceError};
use crate::grounding::ElementIndex;
use crate::scaling::Scaler;
use crate::surface::{InputSurface, MouseButton, StructuredSurface};
use crate::types::{ActionRequest, ActionResult, Outcome, Point};

pub use capture::{capture_with_fallback, ScreenshotHandler};
pub use keyboard::{KeyHandler, TypeHandler};
pub use page::{HoverHandler, NavigateHandler, ScrollHandler, SelectHandler, WaitHandler};
pub use pointer::{ClickHandler, CursorPositionHandler, DragHandler, MoveHandler};

/// Everything a handler may touch while executing one action.
pub struct DispatchContext<'a> {
    pub surface: &'a mut dyn InputSurface,
    pub scaler: Scaler,
    pub index: &'a mut ElementIndex,
    /// Session pointer position, physical coordinates.
    pub pointer: &'a mut Point,
    pub artifacts: &'a dyn ArtifactStore,
    pub draw_overlay: bool,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        request: &ActionRequest,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<Outcome, ActionError>;

    /// Whether the action can change the page, making element ids stale.
    fn mutates_page(&self) -> bool {
        false
    }
}

pub(crate) fn done(message: impl Into<String>) -> Outcome {
    Outcome::Ok {
        message: message.into(),
    }
}

/// The structured side of `surface`, or `Unsupported(op)`.
pub(crate) fn structured<'s>(
    surface: &'s mut dyn InputSurface,
    op: &'static str,
) -> Result<&'s mut dyn StructuredSurface, ActionError> {
    surface
        .as_structured()
        .ok_or(ActionError::Surface(SurfaceError::Unsupported(op)))
}

pub(crate) fn required_text<'r>(request: &'r ActionRequest, what: &str) -> Result<&'r str, ActionError> {
    request
        .text
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ActionError::invalid(format!("'{}' requires {}", request.name, what)))
}

pub(crate) fn required_element(request: &ActionRequest) -> Result<u32, ActionError> {
    request
        .element
        .ok_or_else(|| ActionError::invalid(format!("'{}' requires an element id", request.name)))
}

/// Registry of action handlers, keyed by action name.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// The canonical action set plus the computer-use aliases.
    pub fn standard() -> Self {
        let mut d = Self::new();

        let mv: Arc<dyn ActionHandler> = Arc::new(MoveHandler);
        let click: Arc<dyn ActionHandler> = Arc::new(ClickHandler::new(MouseButton::Left, 1));
        let drag: Arc<dyn ActionHandler> = Arc::new(DragHandler);
        let key: Arc<dyn ActionHandler> = Arc::new(KeyHandler);

        d.register("move", mv.clone())
            .register("mouse_move", mv)
            .register("click", click.clone())
            .register("left_click", click)
            .register("right_click", Arc::new(ClickHandler::new(MouseButton::Right, 1)))
            .register("middle_click", Arc::new(ClickHandler::new(MouseButton::Middle, 1)))
            .register("double_click", Arc::new(ClickHandler::new(MouseButton::Left, 2)))
            .register("triple_click", Arc::new(ClickHandler::new(MouseButton::Left, 3)))
            .register("drag", drag.clone())
            .register("left_click_drag", drag)
            .register("key", key.clone())
            .register("press_key", key)
            .register("type", Arc::new(TypeHandler))
            .register("screenshot", Arc::new(ScreenshotHandler))
            .register("cursor_position", Arc::new(CursorPositionHandler))
            .register("select", Arc::new(SelectHandler))
            .register("hover", Arc::new(HoverHandler))
            .register("scroll", Arc::new(ScrollHandler))
            .register("navigate", Arc::new(NavigateHandler))
            .register("wait", Arc::new(WaitHandler));
        d
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs one action. Recoverable failures come back as a failed result;
    /// `Err` means the surface is gone and the session must end.
    pub async fn execute(
        &self,
        request: &ActionRequest,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<ActionResult, SurfaceError> {
        let Some(handler) = self.handlers.get(&request.name) else {
            warn!("Unsupported action '{}'", request.name);
            return Ok(ActionResult::failed(
                &request.id,
                ErrorKind::UnsupportedAction,
                ActionError::UnsupportedAction(request.name.clone()).to_string(),
            ));
        };

        debug!("Dispatching {:?}", request);
        let outcome = handler.handle(request, ctx).await;
        if handler.mutates_page() {
            ctx.index.invalidate();
        }

        match outcome {
            Ok(outcome) => Ok(ActionResult {
                call_id: request.id.clone(),
                outcome,
            }),
            Err(ActionError::Surface(e)) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Action '{}' failed: {}", request.name, e);
                Ok(ActionResult::failed(&request.id, e.kind(), e.to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifacts::InlineArtifactStore;
    use crate::scaling::Resolution;
    use crate::surface::mock::{button_page, MockSurface, SurfaceCall};
    use crate::types::{Attachment, BoundingBox};

    pub(crate) struct Rig {
        pub surface: MockSurface,
        pub index: ElementIndex,
        pub pointer: Point,
        pub scaler: Scaler,
        store: InlineArtifactStore,
    }

    impl Rig {
        pub fn new(surface: MockSurface, physical: Resolution) -> Self {
            Self {
                surface,
                index: ElementIndex::new(),
                pointer: Point::default(),
                scaler: Scaler::identity(physical),
                store: InlineArtifactStore,
            }
        }

        pub fn scaled(mut self) -> Self {
            self.scaler = Scaler::for_physical(self.scaler.physical());
            self
        }

        pub async fn run(&mut self, request: ActionRequest) -> Result<ActionResult, SurfaceError> {
            let mut ctx = DispatchContext {
                surface: &mut self.surface,
                scaler: self.scaler,
                index: &mut self.index,
                pointer: &mut self.pointer,
                artifacts: &self.store,
                draw_overlay: true,
            };
            Dispatcher::standard().execute(&request, &mut ctx).await
        }
    }

    fn bbox(x: f64, y: f64) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: 100.0,
            height: 30.0,
        }
    }

    fn error_kind(result: &ActionResult) -> Option<ErrorKind> {
        match result.outcome {
            Outcome::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    #[tokio::test]
    async fn move_denormalizes_and_updates_pointer() {
        let physical = Resolution::new(1920, 1200);
        let mut rig = Rig::new(MockSurface::new(physical), physical).scaled();
        let handle = rig.surface.handle();

        let result = rig.run(ActionRequest::new("1", "move").at(640, 400)).await.unwrap();

        assert!(!result.is_error());
        assert_eq!(handle.calls(), vec![SurfaceCall::MoveTo(Point::new(960, 600))]);
        assert_eq!(rig.pointer, Point::new(960, 600));
    }

    #[tokio::test]
    async fn out_of_bounds_never_reaches_surface() {
        let physical = Resolution::new(1920, 1200);
        let mut rig = Rig::new(MockSurface::new(physical), physical).scaled();
        let handle = rig.surface.handle();

        let result = rig.run(ActionRequest::new("1", "mouse_move").at(1281, 10)).await.unwrap();

        assert_eq!(error_kind(&result), Some(ErrorKind::OutOfBounds));
        assert!(handle.calls().is_empty());
        assert_eq!(rig.pointer, Point::default());
    }

    #[tokio::test]
    async fn out_of_bounds_drag_and_click_never_reach_surface() {
        let physical = Resolution::new(1920, 1200);
        let mut rig = Rig::new(MockSurface::new(physical), physical).scaled();
        let handle = rig.surface.handle();

        let drag = rig.run(ActionRequest::new("1", "left_click_drag").at(100, 801)).await.unwrap();
        let click = rig.run(ActionRequest::new("2", "left_click").at(-1, 10)).await.unwrap();

        assert_eq!(error_kind(&drag), Some(ErrorKind::OutOfBounds));
        assert_eq!(error_kind(&click), Some(ErrorKind::OutOfBounds));
        assert!(handle.calls().is_empty());
        assert_eq!(rig.pointer, Point::default());
    }

    #[tokio::test]
    async fn hover_does_not_move_the_session_pointer() {
        let size = Resolution::new(1024, 768);
        let page = button_page(&[(
            "Menu",
            BoundingBox {
                x: 400.0,
                y: 300.0,
                width: 100.0,
                height: 40.0,
            },
        )]);
        let mut rig = Rig::new(MockSurface::with_page(size, page), size);
        let handle = rig.surface.handle();

        rig.run(ActionRequest::new("1", "mouse_move").at(10, 10)).await.unwrap();
        rig.run(ActionRequest::new("2", "screenshot")).await.unwrap();
        rig.run(ActionRequest::new("3", "hover").on_element(1)).await.unwrap();
        assert_eq!(handle.pointer(), Point::new(450, 320));

        let position = rig.run(ActionRequest::new("4", "cursor_position")).await.unwrap();
        assert_eq!(position.outcome, Outcome::CursorPosition { x: 10, y: 10 });

        rig.run(ActionRequest::new("5", "left_click")).await.unwrap();
        let calls = handle.calls();
        assert_eq!(
            calls[calls.len() - 2..],
            [
                SurfaceCall::MoveTo(Point::new(10, 10)),
                SurfaceCall::Click(MouseButton::Left, 1)
            ]
        );
        assert_eq!(handle.pointer(), Point::new(10, 10));
    }

    #[tokio::test]
    async fn unknown_action_is_a_failed_result() {
        let size = Resolution::new(800, 600);
        let mut rig = Rig::new(MockSurface::new(size), size);
        let result = rig.run(ActionRequest::new("7", "teleport")).await.unwrap();
        assert_eq!(result.call_id, "7");
        assert_eq!(error_kind(&result), Some(ErrorKind::UnsupportedAction));
    }

    #[tokio::test]
    async fn drag_without_target_makes_no_native_call() {
        let size = Resolution::new(800, 600);
        let mut rig = Rig::new(MockSurface::new(size), size);
        let handle = rig.surface.handle();

        let result = rig.run(ActionRequest::new("1", "left_click_drag")).await.unwrap();

        assert_eq!(error_kind(&result), Some(ErrorKind::InvalidArgs));
        assert!(handle.calls().is_empty());
    }

    #[tokio::test]
    async fn drag_presses_moves_and_releases() {
        let size = Resolution::new(800, 600);
        let mut rig = Rig::new(MockSurface::new(size), size);
        let handle = rig.surface.handle();

        rig.run(ActionRequest::new("1", "drag").at(100, 50)).await.unwrap();

        assert_eq!(
            handle.calls(),
            vec![
                SurfaceCall::MoveTo(Point::default()),
                SurfaceCall::ButtonDown(MouseButton::Left),
                SurfaceCall::MoveTo(Point::new(100, 50)),
                SurfaceCall::ButtonUp(MouseButton::Left),
            ]
        );
        assert_eq!(rig.pointer, Point::new(100, 50));
    }

    #[tokio::test]
    async fn cursor_position_is_renormalized() {
        let physical = Resolution::new(1920, 1200);
        let mut rig = Rig::new(MockSurface::new(physical), physical).scaled();
        rig.run(ActionRequest::new("1", "move").at(640, 400)).await.unwrap();

        let result = rig.run(ActionRequest::new("2", "cursor_position")).await.unwrap();

        assert_eq!(result.outcome, Outcome::CursorPosition { x: 640, y: 400 });
    }

    #[tokio::test]
    async fn screenshot_indexes_then_clears_overlay() {
        let size = Resolution::new(1024, 768);
        let page = button_page(&[("Sign in", bbox(10.0, 10.0)), ("Register", bbox(10.0, 60.0))]);
        let mut rig = Rig::new(MockSurface::with_page(size, page), size);
        let handle = rig.surface.handle();

        let result = rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();

        match &result.outcome {
            Outcome::Screenshot { image, elements, .. } => {
                assert!(matches!(image, Attachment::Inline(_)));
                assert_eq!(
                    elements.as_deref(),
                    Some("[1] <button> \"Sign in\"\n[2] <button> \"Register\"")
                );
            }
            other => panic!("expected screenshot, got {:?}", other),
        }
        assert_eq!(handle.overlay_nodes(), 0);
        assert_eq!(rig.index.len(), 2);
    }

    #[tokio::test]
    async fn element_ids_go_stale_after_mutation() {
        let size = Resolution::new(1024, 768);
        let page = button_page(&[("Sign in", bbox(10.0, 10.0))]);
        let mut rig = Rig::new(MockSurface::with_page(size, page), size);
        let handle = rig.surface.handle();

        rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();
        let first = rig.run(ActionRequest::new("2", "click").on_element(1)).await.unwrap();
        let second = rig.run(ActionRequest::new("3", "click").on_element(1)).await.unwrap();

        assert!(!first.is_error());
        assert!(handle.calls().contains(&SurfaceCall::ClickElement(
            "/html/body/button[1]".into(),
            MouseButton::Left,
            1
        )));
        assert_eq!(rig.pointer, Point::new(60, 25));
        assert_eq!(error_kind(&second), Some(ErrorKind::ElementNotFound));
    }

    #[tokio::test]
    async fn capture_retries_once_through_fallback() {
        let size = Resolution::new(640, 480);
        let mut rig = Rig::new(MockSurface::new(size).failing_captures(1), size);
        let handle = rig.surface.handle();

        let result = rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();

        assert!(result.image().is_some());
        assert_eq!(handle.calls(), vec![SurfaceCall::Capture, SurfaceCall::CaptureFallback]);
    }

    #[tokio::test]
    async fn failed_fallback_is_a_surface_failure() {
        let size = Resolution::new(640, 480);
        let mut rig = Rig::new(
            MockSurface::new(size).failing_captures(1).failing_fallbacks(1),
            size,
        );
        let result = rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();
        assert_eq!(error_kind(&result), Some(ErrorKind::SurfaceFailure));
    }

    #[tokio::test]
    async fn failed_capture_leaves_no_usable_ids() {
        let size = Resolution::new(1024, 768);
        let page = button_page(&[("Sign in", bbox(10.0, 10.0))]);
        let surface = MockSurface::with_page(size, page)
            .failing_captures(1)
            .failing_fallbacks(1);
        let mut rig = Rig::new(surface, size);
        let handle = rig.surface.handle();

        let shot = rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();
        assert_eq!(error_kind(&shot), Some(ErrorKind::SurfaceFailure));
        assert!(rig.index.is_empty());
        assert_eq!(handle.overlay_nodes(), 0);

        let click = rig.run(ActionRequest::new("2", "click").on_element(1)).await.unwrap();
        assert_eq!(error_kind(&click), Some(ErrorKind::ElementNotFound));
    }

    #[tokio::test]
    async fn lost_surface_escapes_as_error() {
        let size = Resolution::new(640, 480);
        let mut rig = Rig::new(MockSurface::new(size).disconnect_on_call(1), size);
        let err = rig.run(ActionRequest::new("1", "click")).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn screenshot_is_resized_to_logical() {
        let physical = Resolution::new(1920, 1200);
        let mut rig = Rig::new(MockSurface::new(physical), physical).scaled();

        let result = rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();

        let image = result.image().expect("inline image");
        let png = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &image.data).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1280, 800));
    }

    #[tokio::test]
    async fn unrecognized_key_falls_back_to_raw_press() {
        let size = Resolution::new(640, 480);
        let mut rig = Rig::new(MockSurface::new(size), size);
        let handle = rig.surface.handle();

        let result = rig
            .run(ActionRequest::new("1", "key").with_text("hyper+Launch"))
            .await
            .unwrap();

        assert!(!result.is_error());
        assert_eq!(
            handle.calls(),
            vec![SurfaceCall::PressKey(crate::keys::KeyInput::Raw("Launch".into()))]
        );
    }

    #[tokio::test]
    async fn navigate_requires_structured_surface() {
        let size = Resolution::new(640, 480);
        let mut rig = Rig::new(MockSurface::new(size), size);
        let result = rig
            .run(ActionRequest::new("1", "navigate").with_text("https://example.com"))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), Some(ErrorKind::SurfaceFailure));
    }
}
