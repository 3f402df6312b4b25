//! Shard download and record decoding
//!
//! A shard is a (usually gzip, often multi-member) file of line-delimited
//! crawl records. Two line shapes are understood:
//!
//! ```text
//! {"url": "https://acme.com.au/", "status": "200", ...}
//! au,com,acme)/ 20230528093512 {"url": "https://acme.com.au/", ...}
//! ```
//!
//! The second is the CDX index layout (SURT key, timestamp, JSON). Lines
//! that decode as neither, or that have no `url`, are skipped silently.
//!
//! The body is consumed as it arrives from the network. Each received piece
//! is inflated and split into lines immediately, so memory is bounded by the
//! network chunk and the longest line, never by the shard size.

use crate::crawler::index::ShardRef;
use crate::url::CandidateUrl;
use flate2::write::MultiGzDecoder;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors that cause one shard to be skipped
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("Shard {url} unreachable: {source}")]
    Unreachable { url: String, source: reqwest::Error },

    #[error("Shard {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Shard {url} could not be decoded: {source}")]
    Decode {
        url: String,
        source: std::io::Error,
    },
}

/// One decoded shard line; every other field is ignored
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlRecord {
    pub url: String,
}

/// Decodes one shard line into a crawl record
///
/// Returns `None` for lines that are not JSON (bare or CDX-prefixed), lack
/// a string `url` field, or carry an empty one.
pub fn decode_record(line: &str) -> Option<CrawlRecord> {
    let line = line.trim();

    let record = match serde_json::from_str::<CrawlRecord>(line) {
        Ok(record) => record,
        Err(_) => {
            let start = line.find('{')?;
            serde_json::from_str::<CrawlRecord>(&line[start..]).ok()?
        }
    };

    if record.url.trim().is_empty() {
        None
    } else {
        Some(record)
    }
}

/// Starts downloading a shard and returns a stream over its candidate URLs
///
/// Only the status line and headers are awaited here. The body is pulled
/// as the returned stream is polled.
pub async fn fetch_shard(
    client: &Client,
    shard: &ShardRef,
) -> Result<ShardStream<impl Stream<Item = Result<impl AsRef<[u8]>, ShardError>> + Unpin>, ShardError>
{
    let response = client
        .get(shard.as_str())
        .send()
        .await
        .map_err(|source| ShardError::Unreachable {
            url: shard.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ShardError::Status {
            url: shard.to_string(),
            status: status.as_u16(),
        });
    }

    let url = shard.to_string();
    let body = response.bytes_stream().map(move |piece| {
        piece.map_err(|source| ShardError::Unreachable {
            url: url.clone(),
            source,
        })
    });

    Ok(ShardStream::new(shard.to_string(), Box::pin(body)))
}

/// How the shard body is encoded; settled by the first two bytes
enum Encoding {
    Detecting(Vec<u8>),
    Plain(Vec<u8>),
    Gzip(MultiGzDecoder<Vec<u8>>),
}

/// Turns complete lines into queued candidates
struct LineDecoder {
    url: String,
    ready: VecDeque<CandidateUrl>,
    skipped: u64,
}

impl LineDecoder {
    fn accept(&mut self, line: &[u8]) {
        let Ok(text) = std::str::from_utf8(line) else {
            self.skipped += 1;
            return;
        };

        if text.trim().is_empty() {
            return;
        }

        match decode_record(text) {
            Some(record) => self.ready.push_back(CandidateUrl::new(record.url)),
            None => {
                tracing::trace!("Skipping undecodable record in {}", self.url);
                self.skipped += 1;
            }
        }
    }

    /// Consumes every complete line of `buf`, keeping the unterminated tail
    fn take_lines(&mut self, buf: &mut Vec<u8>, at_end: bool) {
        let mut start = 0;
        while let Some(pos) = buf[start..].iter().position(|&b| b == b'\n') {
            self.accept(&buf[start..start + pos]);
            start += pos + 1;
        }
        buf.drain(..start);

        if at_end && !buf.is_empty() {
            self.accept(buf.as_slice());
            buf.clear();
        }
    }
}

/// Single-pass stream over the candidate URLs of one shard
///
/// Gzip bodies are inflated piece by piece as they arrive; other bodies are
/// read as plain text. A transport or inflate error is yielded once, after
/// the candidates decoded before it, and ends the stream.
pub struct ShardStream<S> {
    body: S,
    encoding: Encoding,
    lines: LineDecoder,
    error: Option<ShardError>,
    finished: bool,
}

impl ShardStream<stream::Iter<std::vec::IntoIter<Result<Vec<u8>, ShardError>>>> {
    /// Wraps a body that is already in memory
    pub fn from_body(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(url, stream::iter(vec![Ok(body.into())]))
    }
}

impl<S, B> ShardStream<S>
where
    S: Stream<Item = Result<B, ShardError>> + Unpin,
    B: AsRef<[u8]>,
{
    /// Wraps a stream of raw body pieces
    pub fn new(url: impl Into<String>, body: S) -> Self {
        Self {
            body,
            encoding: Encoding::Detecting(Vec::with_capacity(GZIP_MAGIC.len())),
            lines: LineDecoder {
                url: url.into(),
                ready: VecDeque::new(),
                skipped: 0,
            },
            error: None,
            finished: false,
        }
    }

    /// Number of non-blank lines dropped as undecodable so far
    pub fn skipped(&self) -> u64 {
        self.lines.skipped
    }

    fn decode_error(&self, source: std::io::Error) -> ShardError {
        ShardError::Decode {
            url: self.lines.url.clone(),
            source,
        }
    }

    /// Leaves detection once enough bytes have arrived, or at end of body
    fn settle_encoding(&mut self) -> std::io::Result<()> {
        let head = match std::mem::replace(&mut self.encoding, Encoding::Plain(Vec::new())) {
            Encoding::Detecting(head) => head,
            settled => {
                self.encoding = settled;
                return Ok(());
            }
        };

        if head.starts_with(&GZIP_MAGIC) {
            let mut decoder = MultiGzDecoder::new(Vec::new());
            decoder.write_all(&head)?;
            self.encoding = Encoding::Gzip(decoder);
        } else {
            self.encoding = Encoding::Plain(head);
        }
        Ok(())
    }

    fn feed(&mut self, piece: &[u8]) -> std::io::Result<()> {
        let detected = match &mut self.encoding {
            Encoding::Detecting(head) => {
                head.extend_from_slice(piece);
                head.len() >= GZIP_MAGIC.len()
            }
            Encoding::Plain(buf) => {
                buf.extend_from_slice(piece);
                false
            }
            Encoding::Gzip(decoder) => {
                decoder.write_all(piece)?;
                false
            }
        };

        if detected {
            self.settle_encoding()?;
        }
        self.drain_lines(false);
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.settle_encoding()?;
        if let Encoding::Gzip(decoder) = &mut self.encoding {
            decoder.try_finish()?;
        }
        self.drain_lines(true);
        Ok(())
    }

    fn drain_lines(&mut self, at_end: bool) {
        match &mut self.encoding {
            Encoding::Detecting(_) => {}
            Encoding::Plain(buf) => self.lines.take_lines(buf, at_end),
            Encoding::Gzip(decoder) => self.lines.take_lines(decoder.get_mut(), at_end),
        }
    }
}

impl<S, B> Stream for ShardStream<S>
where
    S: Stream<Item = Result<B, ShardError>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<CandidateUrl, ShardError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(candidate) = this.lines.ready.pop_front() {
                return Poll::Ready(Some(Ok(candidate)));
            }
            if let Some(error) = this.error.take() {
                return Poll::Ready(Some(Err(error)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.body.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(piece))) => {
                    if let Err(e) = this.feed(piece.as_ref()) {
                        this.finished = true;
                        this.error = Some(this.decode_error(e));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    this.error = Some(e);
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if let Err(e) = this.finish() {
                        this.error = Some(this.decode_error(e));
                    }
                }
            }
        }
    }
}
