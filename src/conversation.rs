//! Ordered turn history of one task.
//!
//! Actions are recorded as pairs: a model turn proposing exactly one action,
//! immediately followed by the observer turn carrying its result. Pruning
//! only ever drops whole pairs, oldest first, and never the task turn.

use tracing::{debug, info};

use crate::types::{Attachment, ContentBlock, Outcome, Role, Turn, ELIDED_IMAGE_PLACEHOLDER};

#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::task(task)],
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Whether turns `i` and `i + 1` are an action proposal and its result.
    fn is_pair(&self, i: usize) -> bool {
        let (Some(proposal), Some(observation)) = (self.turns.get(i), self.turns.get(i + 1)) else {
            return false;
        };
        if proposal.role != Role::Model || observation.role != Role::Observer {
            return false;
        }
        match (proposal.proposed_action(), observation.action_result()) {
            (Some(action), Some(result)) => action.id == result.call_id,
            _ => false,
        }
    }

    /// Drops the oldest complete pairs until at most `max_turns` remain or no
    /// pair is left. Returns the number of pairs removed.
    pub fn prune(&mut self, max_turns: usize) -> usize {
        let mut removed = 0;
        while self.turns.len() > max_turns {
            // Index 0 is the task turn.
            let Some(i) = (1..self.turns.len()).find(|&i| self.is_pair(i)) else {
                debug!(
                    "{} turns over the limit of {} but no pairs left to prune",
                    self.turns.len(),
                    max_turns
                );
                break;
            };
            self.turns.drain(i..i + 2);
            removed += 1;
        }
        if removed > 0 {
            info!("Pruned {} action pairs, {} turns remain", removed, self.turns.len());
        }
        removed
    }

    /// Replaces image payloads in all but the `keep` most recent image-bearing
    /// turns with a placeholder. Returns how many turns were elided.
    pub fn elide_images(&mut self, keep: usize) -> usize {
        let mut seen = 0;
        let mut elided = 0;
        for turn in self.turns.iter_mut().rev() {
            if !turn.has_image() {
                continue;
            }
            seen += 1;
            if seen <= keep {
                continue;
            }
            for block in &mut turn.blocks {
                match block {
                    ContentBlock::Image(_) => {
                        *block = ContentBlock::Text(ELIDED_IMAGE_PLACEHOLDER.to_string());
                    }
                    ContentBlock::Result(result) => {
                        if let Outcome::Screenshot { image, .. } = &mut result.outcome {
                            *image = Attachment::Elided;
                        }
                    }
                    _ => {}
                }
            }
            elided += 1;
        }
        elided
    }
}
