//! State module for tracking pipeline progress
//!
//! # Components
//!
//! - `PipelinePhase`: the driver's position in the load/filter/chunk/fetch/flush cycle
//! - `PhaseTracker`: enforces legal phase transitions and logs them

mod phase;

pub use phase::PipelinePhase;

use crate::EnrichError;

/// Holds the current phase and rejects illegal transitions
#[derive(Debug)]
pub struct PhaseTracker {
    current: PipelinePhase,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: PipelinePhase::LoadingIndex,
        }
    }

    pub fn current(&self) -> PipelinePhase {
        self.current
    }

    /// Moves to `next`, failing if the step is not allowed
    pub fn advance(&mut self, next: PipelinePhase) -> Result<(), EnrichError> {
        if !self.current.can_transition_to(next) {
            return Err(EnrichError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        tracing::trace!("Phase {} -> {}", self.current, next);
        self.current = next;
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
