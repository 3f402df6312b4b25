/// Pipeline phase definitions for tracking run progress
///
/// The driver moves through these phases once per run, looping over the
/// per-shard and per-chunk phases.
use std::fmt;

/// Represents the current phase of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    // ===== Setup =====
    /// Retrieving and decompressing the crawl manifest
    LoadingIndex,

    // ===== Per Shard =====
    /// Streaming a shard and applying the domain filter
    Filtering,

    /// Cutting the filtered stream into a bounded chunk
    Chunking,

    // ===== Per Chunk =====
    /// Fetching and extracting the pages of one chunk
    Fetching,

    /// Appending one chunk's results to the sink
    Flushing,

    // ===== Terminal =====
    /// Every planned shard was attempted
    Done,

    /// Cancelled between chunks
    Interrupted,

    /// Stopped by a fatal error
    Failed,
}

impl PipelinePhase {
    /// Returns true if the run can no longer make progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Interrupted | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is a legal step
    ///
    /// `Failed` is reachable from any non-terminal phase. `Interrupted` is
    /// only reachable at a checkpoint boundary: after a flush, or between
    /// shards.
    pub fn can_transition_to(&self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Failed) => true,
            (LoadingIndex, Filtering) | (LoadingIndex, Done) | (LoadingIndex, Interrupted) => true,
            (Filtering, Filtering)
            | (Filtering, Chunking)
            | (Filtering, Done)
            | (Filtering, Interrupted) => true,
            (Chunking, Fetching) | (Chunking, Filtering) | (Chunking, Done) => true,
            (Fetching, Flushing) => true,
            (Flushing, Chunking)
            | (Flushing, Filtering)
            | (Flushing, Done)
            | (Flushing, Interrupted) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadingIndex => "loading_index",
            Self::Filtering => "filtering",
            Self::Chunking => "chunking",
            Self::Fetching => "fetching",
            Self::Flushing => "flushing",
            Self::Done => "done",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
