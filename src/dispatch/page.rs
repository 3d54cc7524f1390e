use async_trait::async_trait;
use std::time::Duration;

use super::{done, required_element, required_text, structured, ActionHandler, DispatchContext};
use crate::error::ActionError;
use crate::surface::ScrollDirection;
use crate::types::{ActionRequest, Outcome};

const SCROLL_NOTCHES: u32 = 3;
const ELEMENT_WAIT: Duration = Duration::from_secs(5);
const DEFAULT_WAIT_MS: u64 = 1000;
const MAX_WAIT_MS: u64 = 30_000;

fn locator_of(ctx: &DispatchContext<'_>, id: u32) -> Result<String, ActionError> {
    Ok(ctx.index.resolve(id)?.locator.clone())
}

/// Picks an option, by visible label or value, in an indexed `<select>`.
pub struct SelectHandler;

#[async_trait]
impl ActionHandler for SelectHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let id = required_element(request)?;
        let option = required_text(request, "an option label")?;
        let locator = locator_of(ctx, id)?;
        structured(&mut *ctx.surface, "select")?
            .select_option(&locator, option)
            .await?;
        Ok(done(format!("selected '{}' in element {}", option, id)))
    }

    fn mutates_page(&self) -> bool {
        true
    }
}

pub struct HoverHandler;

#[async_trait]
impl ActionHandler for HoverHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let id = required_element(request)?;
        let locator = locator_of(ctx, id)?;
        structured(&mut *ctx.surface, "hover")?
            .hover_element(&locator)
            .await?;
        Ok(done(format!("hovering element {}", id)))
    }
}

/// Scrolls an indexed element into view, or turns the wheel at the pointer.
pub struct ScrollHandler;

#[async_trait]
impl ActionHandler for ScrollHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        if let Some(id) = request.element {
            let locator = locator_of(ctx, id)?;
            structured(&mut *ctx.surface, "scroll into view")?
                .scroll_into_view(&locator)
                .await?;
            return Ok(done(format!("scrolled element {} into view", id)));
        }

        let direction: ScrollDirection = required_text(request, "a direction")?
            .parse()
            .map_err(ActionError::InvalidArgs)?;
        ctx.surface.move_to(*ctx.pointer).await?;
        ctx.surface.scroll(direction, SCROLL_NOTCHES).await?;
        Ok(done(format!("scrolled {:?}", direction).to_lowercase()))
    }
}

pub struct NavigateHandler;

#[async_trait]
impl ActionHandler for NavigateHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let url = required_text(request, "a URL")?;
        structured(&mut *ctx.surface, "navigate")?.navigate(url).await?;
        Ok(done(format!("navigated to {}", url)))
    }

    fn mutates_page(&self) -> bool {
        true
    }
}

/// Waits for an indexed element to be present, or for a fixed time.
pub struct WaitHandler;

#[async_trait]
impl ActionHandler for WaitHandler {
    async fn handle(&self, request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        if let Some(id) = request.element {
            let locator = locator_of(ctx, id)?;
            structured(&mut *ctx.surface, "wait for element")?
                .wait_for_element(&locator, ELEMENT_WAIT)
                .await?;
            return Ok(done(format!("element {} is present", id)));
        }

        let ms = match request.text.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_WAIT_MS,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ActionError::invalid(format!("'wait' expects milliseconds, got '{}'", raw)))?,
        };
        let ms = ms.min(MAX_WAIT_MS);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(done(format!("waited {} ms", ms)))
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatch::tests::Rig;
    use crate::error::ErrorKind;
    use crate::scaling::Resolution;
    use crate::surface::mock::{button_page, MockSurface, SurfaceCall};
    use crate::surface::ScrollDirection;
    use crate::types::{ActionRequest, BoundingBox, Outcome};

    fn page_rig() -> Rig {
        let size = Resolution::new(1024, 768);
        let page = button_page(&[(
            "Colour",
            BoundingBox {
                x: 20.0,
                y: 20.0,
                width: 120.0,
                height: 24.0,
            },
        )]);
        Rig::new(MockSurface::with_page(size, page), size)
    }

    #[tokio::test]
    async fn select_resolves_element_and_invalidates() {
        let mut rig = page_rig();
        let handle = rig.surface.handle();
        rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();

        let result = rig
            .run(ActionRequest::new("2", "select").on_element(1).with_text("Blue"))
            .await
            .unwrap();

        assert!(!result.is_error());
        assert!(handle
            .calls()
            .contains(&SurfaceCall::SelectOption("/html/body/button[1]".into(), "Blue".into())));
        assert!(rig.index.is_empty());
    }

    #[tokio::test]
    async fn hover_keeps_index_and_session_pointer() {
        let mut rig = page_rig();
        rig.run(ActionRequest::new("1", "screenshot")).await.unwrap();

        let result = rig.run(ActionRequest::new("2", "hover").on_element(1)).await.unwrap();

        assert!(!result.is_error());
        assert_eq!(rig.index.len(), 1);
        assert_eq!(rig.pointer, crate::types::Point::default());
    }

    #[tokio::test]
    async fn scroll_by_direction() {
        let mut rig = page_rig();
        let handle = rig.surface.handle();

        rig.run(ActionRequest::new("1", "scroll").with_text("down")).await.unwrap();
        let bad = rig.run(ActionRequest::new("2", "scroll").with_text("sideways")).await.unwrap();

        assert_eq!(
            handle.calls(),
            vec![
                SurfaceCall::MoveTo(crate::types::Point::default()),
                SurfaceCall::Scroll(ScrollDirection::Down, 3)
            ]
        );
        assert!(matches!(
            bad.outcome,
            Outcome::Error {
                error: ErrorKind::InvalidArgs,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn select_without_element_is_invalid() {
        let mut rig = page_rig();
        let result = rig
            .run(ActionRequest::new("1", "select").with_text("Blue"))
            .await
            .unwrap();
        assert!(matches!(
            result.outcome,
            Outcome::Error {
                error: ErrorKind::InvalidArgs,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn wait_rejects_non_numeric_duration() {
        let mut rig = page_rig();
        let result = rig
            .run(ActionRequest::new("1", "wait").with_text("soon"))
            .await
            .unwrap();
        assert!(result.is_error());

        let ok = rig.run(ActionRequest::new("2", "wait").with_text("5")).await.unwrap();
        assert!(!ok.is_error());
    }
}
