use async_trait::async_trait;
use image::imageops::FilterType;
use std::io::Cursor;
use tracing::{debug, warn};

use super::{ActionHandler, DispatchContext};
use crate::error::{ActionError, SurfaceError};
use crate::scaling::Resolution;
use crate::surface::InputSurface;
use crate::types::{ActionRequest, Attachment, Outcome};

/// Captures the surface, retrying once through the fallback path on a
/// recoverable failure.
pub async fn capture_with_fallback(surface: &mut dyn InputSurface) -> Result<Vec<u8>, SurfaceError> {
    match surface.capture().await {
        Ok(png) => Ok(png),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Capture failed ({}), retrying through fallback", e);
            surface.capture_fallback().await
        }
    }
}

fn resize_png(png: &[u8], to: Resolution) -> Result<Vec<u8>, SurfaceError> {
    let img = image::load_from_memory(png).map_err(|e| SurfaceError::primitive("decode capture", e))?;
    if (img.width(), img.height()) == (to.width, to.height) {
        return Ok(png.to_vec());
    }
    let resized = img.resize_exact(to.width, to.height, FilterType::Triangle);
    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .map_err(|e| SurfaceError::primitive("encode capture", e))?;
    Ok(out.into_inner())
}

/// On structured surfaces this is also the grounding pass: the index is
/// rebuilt, drawn, captured, and the overlay removed again.
pub struct ScreenshotHandler;

impl ScreenshotHandler {
    async fn clear_overlay(ctx: &mut DispatchContext<'_>) -> Result<(), SurfaceError> {
        if let Some(surface) = ctx.surface.as_structured() {
            ctx.index.clear(surface).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ActionHandler for ScreenshotHandler {
    async fn handle(&self, _request: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<Outcome, ActionError> {
        let pass = match ctx.surface.as_structured() {
            Some(surface) => Some(ctx.index.rebuild(surface, ctx.draw_overlay).await),
            None => None,
        };
        let elements = match pass {
            Some(Ok(snapshot)) => Some(snapshot.listing()),
            Some(Err(e)) => {
                if let Err(clear_err) = Self::clear_overlay(ctx).await {
                    warn!("Overlay cleanup failed: {}", clear_err);
                }
                return Err(e.into());
            }
            None => None,
        };

        let captured = capture_with_fallback(&mut *ctx.surface).await;
        let cleared = Self::clear_overlay(ctx).await;
        let mut png = match captured {
            Ok(png) => png,
            Err(e) => {
                // The model never saw this listing.
                ctx.index.invalidate();
                return Err(e.into());
            }
        };
        match cleared {
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("Overlay cleanup failed: {}", e),
            Ok(()) => {}
        }

        if ctx.scaler.is_scaled() {
            let logical = ctx.scaler.logical();
            debug!("Resizing capture to {}", logical);
            png = tokio::task::spawn_blocking(move || resize_png(&png, logical))
                .await
                .map_err(|e| SurfaceError::primitive("resize capture", e))??;
        }

        let stored = ctx
            .artifacts
            .store_png(&png)
            .await
            .map_err(|e| SurfaceError::primitive("store capture", e))?;

        Ok(Outcome::Screenshot {
            image: Attachment::Inline(stored.image),
            path: stored.path.map(|p| p.display().to_string()),
            elements,
        })
    }
}
