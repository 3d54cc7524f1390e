use async_trait::async_trait;
use tracing::warn;

use super::{done, structured, ActionHandler, DispatchContext};
use crate::error::ActionError;
use crate::surface::MouseButton;
use crate::types::{ActionRequest, Outcome};

pub struct MoveHandler;

#[async_trait]
impl ActionHandler for MoveHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let (x, y) = request
            .coordinate
            .ok_or_else(|| ActionError::invalid("'move' requires a coordinate"))?;
        let target = ctx.scaler.denormalize(x, y)?;
        ctx.surface.move_to(target).await?;
        *ctx.pointer = target;
        Ok(done(format!("moved to ({}, {})", x, y)))
    }
}

/// Clicks at the pointer, at an optional coordinate, or on an indexed element.
pub struct ClickHandler {
    button: MouseButton,
    count: u32,
}

impl ClickHandler {
    pub fn new(button: MouseButton, count: u32) -> Self {
        Self { button, count }
    }

    fn describe(&self) -> &'static str {
        match (self.button, self.count) {
            (MouseButton::Right, _) => "right-clicked",
            (MouseButton::Middle, _) => "middle-clicked",
            (_, 2) => "double-clicked",
            (_, n) if n > 2 => "triple-clicked",
            _ => "clicked",
        }
    }
}

#[async_trait]
impl ActionHandler for ClickHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        if let Some(id) = request.element {
            let locator = ctx.index.resolve(id)?.locator.clone();
            let at = structured(&mut *ctx.surface, "element click")?
                .click_element(&locator, self.button, self.count)
                .await?;
            *ctx.pointer = at;
            return Ok(done(format!("{} element {}", self.describe(), id)));
        }

        // Hover moves the native pointer without moving the session's.
        let target = match request.coordinate {
            Some((x, y)) => ctx.scaler.denormalize(x, y)?,
            None => *ctx.pointer,
        };
        ctx.surface.move_to(target).await?;
        *ctx.pointer = target;
        ctx.surface.click(self.button, self.count).await?;

        let at = ctx.scaler.normalize(*ctx.pointer);
        Ok(done(format!("{} at ({}, {})", self.describe(), at.x, at.y)))
    }

    fn mutates_page(&self) -> bool {
        true
    }
}

/// Press at the pointer, move to the target, release.
pub struct DragHandler;

#[async_trait]
impl ActionHandler for DragHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let (x, y) = request
            .coordinate
            .ok_or_else(|| ActionError::invalid("'drag' requires an end coordinate"))?;
        let end = ctx.scaler.denormalize(x, y)?;

        ctx.surface.move_to(*ctx.pointer).await?;
        ctx.surface.button_down(MouseButton::Left).await?;
        let moved = ctx.surface.move_to(end).await;
        // The button must not stay held, whatever happened to the move.
        let released = ctx.surface.button_up(MouseButton::Left).await;
        if let (Err(_), Err(e)) = (&moved, &released) {
            warn!("Button release after failed drag also failed: {}", e);
        }
        moved?;
        released?;

        *ctx.pointer = end;
        Ok(done(format!("dragged to ({}, {})", x, y)))
    }

    fn mutates_page(&self) -> bool {
        true
    }
}

pub struct CursorPositionHandler;

#[async_trait]
impl ActionHandler for CursorPositionHandler {
    async fn handle(&self, _request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let logical = ctx.scaler.normalize(*ctx.pointer);
        Ok(Outcome::CursorPosition {
            x: logical.x,
            y: logical.y,
        })
    }
}
