//! Streaming relay from an upload body to a download response.
//!
//! The upload body is `multipart/form-data` with an optional `size` part
//! followed by a `file` part. [`open`] reads up to the start of the file
//! part and returns the [`RelayMetadata`] plus a [`RelayStream`] that yields
//! the file bytes as they arrive and reports the outcome to the uploader
//! when it ends.
//!
//! Nothing here buffers more than one transport chunk: the multipart parser
//! is fed one chunk per poll, and the stream hands each chunk on as soon as
//! it is parsed.

use crate::error::{RelayError, Result};
use crate::server::RelayMetrics;
use crate::session::PeerLink;
use axum::body::Body;
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use passthru_types::{parse_declared_length, RelayMetadata, TransferOutcome};
use std::io;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

/// Name of the optional part carrying the declared payload length.
pub const SIZE_PART: &str = "size";

/// Name of the part carrying the payload.
pub const FILE_PART: &str = "file";

/// Longest `size` part worth parsing; `u64::MAX` has 20 digits.
const MAX_SIZE_PART_LEN: usize = 32;

/// The uploader's request body, parked in the session until a peer claims it.
pub struct UploadBody {
    content_type: Option<String>,
    body: Body,
}

impl std::fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadBody")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl UploadBody {
    /// Wrap a request body and its `Content-Type` header value.
    pub fn new(content_type: Option<String>, body: Body) -> Self {
        Self { content_type, body }
    }
}

/// Parse the upload's leading parts and prepare the payload stream.
///
/// # Errors
///
/// [`RelayError::InvalidRequest`] if the body is not multipart, or the first
/// part after an optional `size` part is missing or not named `file`.
pub async fn open(upload: UploadBody) -> Result<(RelayMetadata, FilePart)> {
    let content_type = upload
        .content_type
        .ok_or_else(|| RelayError::invalid("missing content type"))?;
    let boundary = multer::parse_boundary(&content_type).map_err(RelayError::invalid)?;

    let source = Paced::new(upload.body.into_data_stream().boxed());
    let mut multipart = multer::Multipart::new(source, boundary);
    let mut metadata = RelayMetadata::default();

    let first = next_part(&mut multipart).await?;
    let field = if first.name() == Some(SIZE_PART) {
        let mut size_part = first;
        metadata.declared_length = read_declared_length(&mut size_part).await;
        // multer refuses to advance while an earlier field is alive.
        drop(size_part);
        next_part(&mut multipart).await?
    } else {
        first
    };

    if field.name() != Some(FILE_PART) {
        return Err(RelayError::invalid(format!(
            "expected a \"{FILE_PART}\" part, got {:?}",
            field.name()
        )));
    }

    metadata.content_type = field.content_type().map(ToString::to_string);
    metadata.filename = field.file_name().map(str::to_owned);

    Ok((
        metadata,
        FilePart {
            chunks: field.boxed(),
        },
    ))
}

async fn next_part(multipart: &mut multer::Multipart<'static>) -> Result<multer::Field<'static>> {
    multipart
        .next_field()
        .await
        .map_err(RelayError::invalid)?
        .ok_or_else(|| RelayError::invalid(format!("missing \"{FILE_PART}\" part")))
}

/// Read a `size` part. Any problem just means no declared length.
async fn read_declared_length(field: &mut multer::Field<'static>) -> Option<u64> {
    let mut text = Vec::new();
    while let Some(chunk) = field.chunk().await.ok()? {
        if text.len() + chunk.len() > MAX_SIZE_PART_LEN {
            return None;
        }
        text.extend_from_slice(&chunk);
    }
    parse_declared_length(std::str::from_utf8(&text).ok()?)
}

/// The payload of the upload's `file` part, not yet relayed.
pub struct FilePart {
    chunks: BoxStream<'static, std::result::Result<Bytes, multer::Error>>,
}

impl std::fmt::Debug for FilePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePart").finish_non_exhaustive()
    }
}

impl FilePart {
    /// Turn the file part into a response stream bound to the uploader.
    pub fn into_stream(
        self,
        metadata: &RelayMetadata,
        link: PeerLink,
        metrics: Arc<RelayMetrics>,
    ) -> RelayStream {
        RelayStream {
            chunks: self.chunks,
            link: Some(link),
            declared_length: metadata.declared_length,
            relayed: 0,
            held: None,
            metrics,
        }
    }
}

/// Download body that copies the file part chunk by chunk.
///
/// Reports [`TransferOutcome::Ok`] when the part ends cleanly and matches any
/// declared length, [`TransferOutcome::Failed`] on a read error or length
/// mismatch. If the response is dropped early, the [`PeerLink`] drop reports
/// the failure.
///
/// With a declared length the server stops polling once that many bytes are
/// out, so the chunk that completes the length is held back until the end of
/// the part has been seen and the outcome sent.
pub struct RelayStream {
    chunks: BoxStream<'static, std::result::Result<Bytes, multer::Error>>,
    link: Option<PeerLink>,
    declared_length: Option<u64>,
    relayed: u64,
    held: Option<Bytes>,
    metrics: Arc<RelayMetrics>,
}

impl RelayStream {
    /// Poll the file part until it ends, for responses that are never polled.
    ///
    /// A zero-length response body is not read by the server, so the outcome
    /// has to be settled before the response goes out.
    pub async fn settle(&mut self) {
        while let Some(item) = self.next().await {
            if item.is_err() {
                break;
            }
        }
    }

    fn finish(&mut self, outcome: TransferOutcome) {
        if let Some(link) = self.link.take() {
            link.finish(outcome);
        }
    }

    fn fail(&mut self, error: RelayError) -> Poll<Option<io::Result<Bytes>>> {
        tracing::warn!("Relay failed after {} bytes: {}", self.relayed, error);
        self.held = None;
        self.finish(TransferOutcome::Failed);
        Poll::Ready(Some(Err(io::Error::other(error))))
    }

    fn length_reached(&self) -> bool {
        self.declared_length == Some(self.relayed)
    }
}

impl Stream for RelayStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.link.is_none() {
                return Poll::Ready(this.held.take().map(Ok));
            }

            match ready!(this.chunks.poll_next_unpin(cx)) {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    if this.length_reached() {
                        return this.fail(RelayError::RelayIo(format!(
                            "more than the declared {} bytes",
                            this.relayed
                        )));
                    }

                    let len = chunk.len() as u64;
                    this.relayed += len;
                    this.metrics.bytes_relayed.fetch_add(len, Ordering::Relaxed);
                    this.metrics
                        .largest_chunk_bytes
                        .fetch_max(len, Ordering::Relaxed);

                    match this.declared_length {
                        Some(declared) if this.relayed > declared => {
                            return this.fail(RelayError::RelayIo(format!(
                                "declared {} bytes, got at least {}",
                                declared, this.relayed
                            )));
                        }
                        Some(_) if this.length_reached() => this.held = Some(chunk),
                        _ => return Poll::Ready(Some(Ok(chunk))),
                    }
                }
                Some(Err(e)) => return this.fail(RelayError::RelayIo(e.to_string())),
                None => {
                    match this.declared_length {
                        Some(declared) if declared != this.relayed => {
                            tracing::warn!(
                                "Relay length mismatch: declared {}, relayed {}",
                                declared,
                                this.relayed
                            );
                            this.finish(TransferOutcome::Failed);
                        }
                        _ => this.finish(TransferOutcome::Ok),
                    }
                    return Poll::Ready(this.held.take().map(Ok));
                }
            }
        }
    }
}

/// Hands the wrapped stream's items over one per poll.
///
/// multer drains every ready chunk into its buffer on each poll; yielding
/// `Pending` between items keeps that buffer to a single chunk.
struct Paced<S> {
    inner: S,
    yielded: bool,
}

impl<S> Paced<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            yielded: false,
        }
    }
}

impl<S: Stream + Unpin> Stream for Paced<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.yielded {
            this.yielded = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        let item = ready!(this.inner.poll_next_unpin(cx));
        this.yielded = item.is_some();
        Poll::Ready(item)
    }
}
