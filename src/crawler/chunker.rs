//! Lazy chunking of a shard's candidate stream
//!
//! Candidates are pulled from the underlying stream only as fast as chunks
//! are requested, so a shard is never buffered in full.

use crate::crawler::shard::ShardError;
use crate::url::{CandidateUrl, DomainFilter, FilteredUrl};
use futures::stream::{Stream, StreamExt};

/// Cuts a stream of candidates into bounded chunks of filtered URLs
///
/// Every chunk holds `chunk_size` URLs except possibly the last. A read
/// error ends the stream: the partial chunk collected before it is still
/// returned, and the error is kept for [`Chunker::take_error`].
pub struct Chunker<'a, S> {
    inner: S,
    filter: &'a DomainFilter,
    chunk_size: usize,
    candidates: u64,
    filtered: u64,
    error: Option<ShardError>,
    exhausted: bool,
}

impl<'a, S> Chunker<'a, S>
where
    S: Stream<Item = Result<CandidateUrl, ShardError>> + Unpin,
{
    /// A `chunk_size` of zero is treated as one
    pub fn new(inner: S, filter: &'a DomainFilter, chunk_size: usize) -> Self {
        Self {
            inner,
            filter,
            chunk_size: chunk_size.max(1),
            candidates: 0,
            filtered: 0,
            error: None,
            exhausted: false,
        }
    }

    /// Candidates pulled from the stream so far
    pub fn candidates(&self) -> u64 {
        self.candidates
    }

    /// Candidates that passed the domain filter so far
    pub fn filtered(&self) -> u64 {
        self.filtered
    }

    /// Removes and returns the error that ended the stream, if any
    pub fn take_error(&mut self) -> Option<ShardError> {
        self.error.take()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Pulls candidates until a chunk is full or the stream ends
    ///
    /// Returns `None` once no filtered URL remains.
    pub async fn next_chunk(&mut self) -> Option<Vec<FilteredUrl>> {
        if self.exhausted {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.chunk_size);

        while chunk.len() < self.chunk_size {
            match self.inner.next().await {
                Some(Ok(candidate)) => {
                    self.candidates += 1;
                    if let Some(url) = self.filter.admit(candidate) {
                        self.filtered += 1;
                        chunk.push(url);
                    }
                }
                Some(Err(e)) => {
                    self.error = Some(e);
                    self.exhausted = true;
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}
