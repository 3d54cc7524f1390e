use async_trait::async_trait;

use super::{done, required_text, structured, ActionHandler, DispatchContext};
use crate::error::ActionError;
use crate::keys::parse_key_sequence;
use crate::types::{ActionRequest, Outcome};

/// Focuses the requested element first, when there is one.
async fn focus_target(request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<(), ActionError> {
    if let Some(id) = request.element {
        let locator = ctx.index.resolve(id)?.locator.clone();
        structured(&mut *ctx.surface, "element focus")?
            .focus_element(&locator)
            .await?;
    }
    Ok(())
}

/// `key` and `press_key`: one or more whitespace-separated combos.
pub struct KeyHandler;

#[async_trait]
impl ActionHandler for KeyHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let combo = request
            .key
            .as_deref()
            .or(request.text.as_deref())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ActionError::invalid(format!("'{}' requires a key", request.name)))?;

        focus_target(request, ctx).await?;
        for key in parse_key_sequence(combo) {
            ctx.surface.press_key(&key).await?;
        }
        Ok(done(format!("pressed {}", combo)))
    }

    fn mutates_page(&self) -> bool {
        true
    }
}

pub struct TypeHandler;

#[async_trait]
impl ActionHandler for TypeHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let text = required_text(request, "text")?;
        focus_target(request, ctx).await?;
        ctx.surface.type_text(text).await?;
        Ok(done(format!("typed {} characters", text.chars().count())))
    }

    fn mutates_page(&self) -> bool {
        true
    }
}
