//! Numbered index of the interactive elements on a structured surface.
//!
//! Ids are only meaningful for the pass that produced them: every rebuild
//! replaces the whole record set, and any page-mutating action invalidates it.

pub mod node;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{ActionError, SurfaceError};
use crate::surface::{OverlayMark, StructuredSurface};
use crate::types::ElementRecord;

pub use node::{compute_label, compute_locator, Candidate, Control, DomNode, NodeSnapshot, NodeView};

/// The records produced by one grounding pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub generation: u64,
    pub records: Vec<ElementRecord>,
}

impl IndexSnapshot {
    /// One line per element: `[id] <tag> "label"`.
    pub fn listing(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("[{}] <{}> \"{}\"", r.id, r.tag, r.label))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turns raw candidates into dense records: candidates without a box are
/// skipped, later candidates whose rounded box repeats an earlier one are
/// dropped, and survivors are numbered from 1 in document order.
pub fn assign_ids(snapshot: &NodeSnapshot) -> Vec<ElementRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for candidate in &snapshot.candidates {
        let (Some(bbox), Some(node)) = (candidate.bbox, snapshot.node(candidate.node)) else {
            continue;
        };
        if !seen.insert(bbox.rounded()) {
            continue;
        }
        records.push(ElementRecord {
            id: records.len() as u32 + 1,
            tag: node.tag_name().to_string(),
            locator: compute_locator(&node),
            label: compute_label(&node),
            bbox,
        });
    }
    records
}

#[derive(Debug)]
struct OverlayPass {
    tag: String,
    injected: usize,
}

#[derive(Debug, Default)]
pub struct ElementIndex {
    records: HashMap<u32, ElementRecord>,
    generation: u64,
    overlay: Option<OverlayPass>,
}

impl ElementIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    /// Runs a grounding pass, replacing every record. With `draw_overlay`,
    /// a numbered box is drawn over each element until [`clear`](Self::clear).
    pub async fn rebuild(
        &mut self,
        surface: &mut dyn StructuredSurface,
        draw_overlay: bool,
    ) -> Result<IndexSnapshot, SurfaceError> {
        self.clear(surface).await?;
        self.records.clear();

        let nodes = surface.query_interactive_nodes().await?;
        let records = assign_ids(&nodes);
        self.generation += 1;
        debug!(
            "Grounding pass {}: {} candidates, {} indexed",
            self.generation,
            nodes.candidates.len(),
            records.len()
        );

        if draw_overlay && !records.is_empty() {
            let tag = format!("gp-{}", self.generation);
            let marks: Vec<OverlayMark> = records
                .iter()
                .map(|r| OverlayMark {
                    id: r.id,
                    bbox: r.bbox,
                })
                .collect();
            // Recorded before drawing so a partial failure can still be cleaned up by tag.
            self.overlay = Some(OverlayPass {
                tag: tag.clone(),
                injected: 0,
            });
            let injected = surface.draw_overlay(&tag, &marks).await?;
            if let Some(pass) = self.overlay.as_mut() {
                pass.injected = injected;
            }
        }

        self.records = records.iter().map(|r| (r.id, r.clone())).collect();
        info!("Indexed {} interactive elements", records.len());
        Ok(IndexSnapshot {
            generation: self.generation,
            records,
        })
    }

    /// Removes the overlay drawn by the last pass, if any. Returns the number
    /// of overlay nodes removed. Records are kept.
    pub async fn clear(&mut self, surface: &mut dyn StructuredSurface) -> Result<usize, SurfaceError> {
        let Some(pass) = self.overlay.take() else {
            return Ok(0);
        };
        let removed = match surface.remove_overlay(&pass.tag).await {
            Ok(removed) => removed,
            Err(e) => {
                // Keep the tag so the next clear or rebuild retries the removal.
                self.overlay = Some(pass);
                return Err(e);
            }
        };
        if removed != pass.injected {
            warn!(
                "Overlay {} injected {} nodes but {} were removed",
                pass.tag, pass.injected, removed
            );
        }
        Ok(removed)
    }

    /// Forgets all records; ids from earlier passes no longer resolve.
    pub fn invalidate(&mut self) {
        if !self.records.is_empty() {
            debug!("Invalidating element index generation {}", self.generation);
        }
        self.records.clear();
    }

    pub fn resolve(&self, id: u32) -> Result<&ElementRecord, ActionError> {
        self.records.get(&id).ok_or(ActionError::ElementNotFound(id))
    }
}
