//! Stream coupling between the upload, the transcoder process, and the
//! response body.
//!
//! Three cooperative pieces run per request:
//!
//! - the **forward pump** ([`pump_upload`]) copies multipart upload chunks
//!   into the process stdin, pausing whenever the pipe buffer is full;
//! - the **diagnostic capture** ([`capture_stderr`]) drains stderr into a
//!   bounded buffer off the main path;
//! - the **reverse direction** is the response body itself
//!   ([`CoupledBody`]), yielding process stdout chunks as they arrive and
//!   killing the process if the client goes away.
//!
//! Copy errors in either direction are logged and tear down the paired
//! resource; they never alter a response that is already in flight.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Multipart;
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use af_av::ProcessHandle;

/// How much stderr output is retained for diagnostics.
const DIAGNOSTIC_CAP: usize = 8 * 1024;

/// Upper bound on the `detail` excerpt returned to clients.
pub const EXCERPT_MAX_CHARS: usize = 1000;

// ---------------------------------------------------------------------------
// Upload metadata
// ---------------------------------------------------------------------------

/// Details of the accepted upload part, reported back to the handler before
/// any bytes are pumped.
#[derive(Debug)]
pub struct UploadMeta {
    /// Client-supplied filename, if any.
    pub filename: Option<String>,
}

// ---------------------------------------------------------------------------
// Forward direction: upload -> process stdin
// ---------------------------------------------------------------------------

/// Pump the multipart `file` field into the process input channel.
///
/// Runs as its own task so the forward and reverse directions make progress
/// independently (a handler that awaited stdin writes while not draining
/// stdout would deadlock against a full pipe). The task owns the multipart
/// stream; it reports the accepted part through `meta_tx` (a validation
/// error when the field is missing or the body is unreadable) and then
/// parks until the handler, having spawned the process, sends the stdin
/// channel. Fields other than `file` are skipped; only the first `file`
/// field is consumed. Errors after the handoff only tear down the pump,
/// never the response.
pub async fn pump_upload(
    mut multipart: Multipart,
    meta_tx: oneshot::Sender<af_core::Result<UploadMeta>>,
    stdin_rx: oneshot::Receiver<Box<dyn AsyncWrite + Send + Unpin>>,
) {
    let mut field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => {
                let _ = meta_tx.send(Err(af_core::Error::Validation(
                    "missing multipart field \"file\"".into(),
                )));
                return;
            }
            Err(e) => {
                // Covers malformed bodies and the configured body limit.
                let _ = meta_tx.send(Err(af_core::Error::Validation(format!(
                    "unreadable multipart upload: {e}"
                ))));
                return;
            }
        }
    };

    let meta = UploadMeta {
        filename: field.file_name().map(str::to_string),
    };
    if meta_tx.send(Ok(meta)).is_err() {
        return;
    }

    // The handler drops the sender when spawning failed; nothing to pump.
    let Ok(mut stdin) = stdin_rx.await else {
        return;
    };

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                // write_all suspends while the pipe buffer is full, so the
                // upload is never buffered beyond one chunk.
                if let Err(e) = stdin.write_all(&chunk).await {
                    if e.kind() == io::ErrorKind::BrokenPipe {
                        tracing::debug!("Transcoder closed stdin early: {e}");
                    } else {
                        tracing::warn!("Error writing to transcoder stdin: {e}");
                    }
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Error reading upload stream: {e}");
                // Dropping stdin signals EOF; the process finishes with
                // whatever input it got.
                return;
            }
        }
    }

    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("Error closing transcoder stdin: {e}");
    }
}

// ---------------------------------------------------------------------------
// Diagnostic channel
// ---------------------------------------------------------------------------

/// Bounded in-memory accumulator for the process's stderr.
#[derive(Clone)]
pub struct DiagnosticBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append bytes, silently discarding anything past the cap.
    pub fn push(&self, chunk: &[u8]) {
        let mut buf = self.inner.lock();
        let room = DIAGNOSTIC_CAP.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    /// Lossy excerpt of the accumulated text, bounded to `max_chars`.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let buf = self.inner.lock();
        String::from_utf8_lossy(&buf).chars().take(max_chars).collect()
    }
}

impl Default for DiagnosticBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain the process's error channel into the diagnostic buffer until EOF.
///
/// Runs as its own task so diagnostics accumulation never blocks the data
/// pipeline.
pub async fn capture_stderr(
    mut stderr: Box<dyn AsyncRead + Send + Unpin>,
    diagnostics: DiagnosticBuffer,
) {
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => diagnostics.push(&buf[..n]),
            Err(e) => {
                tracing::debug!("Error reading transcoder stderr: {e}");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Process supervision after headers are committed
// ---------------------------------------------------------------------------

/// Await the process exit, or kill it when the request is cancelled
/// (client disconnect).
///
/// By the time this runs the response is streaming, so a failure can no
/// longer change the status code; non-zero exits are logged server-side and
/// the client sees a truncated body.
pub async fn supervise(
    mut handle: Box<dyn ProcessHandle>,
    cancel: CancellationToken,
    diagnostics: DiagnosticBuffer,
) {
    tokio::select! {
        exit = handle.wait() => match exit {
            Ok(exit) if exit.success => {
                tracing::debug!("Transcoder exited cleanly");
            }
            Ok(exit) => {
                tracing::warn!(
                    code = ?exit.code,
                    detail = %diagnostics.excerpt(EXCERPT_MAX_CHARS),
                    "Transcoder failed mid-stream; response truncated"
                );
            }
            Err(e) => {
                tracing::warn!("Error awaiting transcoder exit: {e}");
            }
        },
        _ = cancel.cancelled() => {
            tracing::debug!("Client disconnected; terminating transcoder");
            if let Err(e) = handle.start_kill() {
                tracing::warn!("Failed to kill transcoder: {e}");
            }
            // Reap so the process cannot outlive the request.
            let _ = handle.wait().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Reverse direction: process stdout -> response body
// ---------------------------------------------------------------------------

/// Response body stream: the already-read first chunk followed by the rest
/// of the process output, in production order.
///
/// Holds a [`DropGuard`] so that dropping the body (client disconnect, or
/// hyper tearing down the connection) cancels the supervision token and
/// kills the process.
pub struct CoupledBody {
    first: Option<Bytes>,
    rest: ReaderStream<Box<dyn AsyncRead + Send + Unpin>>,
    _cancel_on_drop: DropGuard,
}

impl CoupledBody {
    pub fn new(
        first: Bytes,
        rest: ReaderStream<Box<dyn AsyncRead + Send + Unpin>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            first: Some(first),
            rest,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}

impl Stream for CoupledBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(chunk) = this.first.take() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        Pin::new(&mut this.rest).poll_next(cx)
    }
}
