//! Per-task state: the owned surface, turn history, element index, pointer
//! position and scaling.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::conversation::Conversation;
use crate::dispatch::DispatchContext;
use crate::error::{FatalError, SurfaceError};
use crate::grounding::ElementIndex;
use crate::scaling::Scaler;
use crate::surface::InputSurface;
use crate::types::Point;

pub struct Session {
    id: Uuid,
    surface: Box<dyn InputSurface>,
    conversation: Conversation,
    index: ElementIndex,
    pointer: Point,
    scaler: Scaler,
    released: bool,
}

impl Session {
    /// Takes ownership of `surface` for one task. If the surface cannot
    /// report its size it is released here and the task fails.
    pub async fn open(
        task: &str,
        mut surface: Box<dyn InputSurface>,
        scaling: bool,
    ) -> Result<Self, FatalError> {
        let id = Uuid::new_v4();

        let physical = match surface.physical_size().await {
            Ok(size) => size,
            Err(e) => {
                error!("Session {}: {} surface failed to open: {}", id, surface.name(), e);
                release_quietly(surface.as_mut()).await;
                return Err(FatalError::SurfaceUnavailable { message: e.to_string() });
            }
        };

        let pointer = match surface.current_position().await {
            Ok(p) => p,
            Err(e) if e.is_fatal() => {
                release_quietly(surface.as_mut()).await;
                return Err(e.into());
            }
            Err(e) => {
                debug!("Pointer position unknown at start ({}), assuming origin", e);
                Point::default()
            }
        };

        let scaler = if scaling {
            Scaler::for_physical(physical)
        } else {
            Scaler::identity(physical)
        };
        info!(
            "Session {} on {} surface: physical {}, logical {}",
            id,
            surface.name(),
            scaler.physical(),
            scaler.logical()
        );

        Ok(Self {
            id,
            surface,
            conversation: Conversation::new(task),
            index: ElementIndex::new(),
            pointer,
            scaler,
            released: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scaler(&self) -> Scaler {
        self.scaler
    }

    pub fn pointer(&self) -> Point {
        self.pointer
    }

    pub fn index(&self) -> &ElementIndex {
        &self.index
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn is_structured(&mut self) -> bool {
        self.surface.as_structured().is_some()
    }

    pub fn context<'a>(&'a mut self, artifacts: &'a dyn ArtifactStore, draw_overlay: bool) -> DispatchContext<'a> {
        DispatchContext {
            surface: self.surface.as_mut(),
            scaler: self.scaler,
            index: &mut self.index,
            pointer: &mut self.pointer,
            artifacts,
            draw_overlay,
        }
    }

    /// Removes any overlay still on screen and releases the surface.
    pub async fn release(mut self) -> Result<(), SurfaceError> {
        self.released = true;
        if self.index.has_overlay() {
            if let Some(structured) = self.surface.as_structured() {
                if let Err(e) = self.index.clear(structured).await {
                    warn!("Session {}: overlay left behind: {}", self.id, e);
                }
            }
        }
        let result = self.surface.release().await;
        info!("Session {} released {} surface", self.id, self.surface.name());
        result
    }
}

async fn release_quietly(surface: &mut dyn InputSurface) {
    if let Err(e) = surface.release().await {
        warn!("Releasing {} surface failed: {}", surface.name(), e);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.released {
            warn!("Session {} dropped without releasing its surface", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::Resolution;
    use crate::surface::MockSurface;

    #[tokio::test]
    async fn open_failure_releases_surface() {
        let surface = MockSurface::unavailable();
        let handle = surface.handle();

        let err = Session::open("task", Box::new(surface), true).await.err().unwrap();

        assert!(matches!(err, FatalError::SurfaceUnavailable { .. }));
        assert!(handle.released());
    }

    #[tokio::test]
    async fn scaling_can_be_disabled() {
        let size = Resolution::new(1920, 1200);
        let scaled = Session::open("t", Box::new(MockSurface::new(size)), true).await.unwrap();
        let raw = Session::open("t", Box::new(MockSurface::new(size)), false).await.unwrap();

        assert_eq!(scaled.scaler().logical(), Resolution::new(1280, 800));
        assert_eq!(raw.scaler().logical(), size);

        scaled.release().await.unwrap();
        raw.release().await.unwrap();
    }
}
