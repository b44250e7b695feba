//! Streaming audio conversion endpoint.
//!
//! `POST /convert/audio` accepts a multipart upload and streams the
//! transcoded result back without ever touching disk. The request is
//! admitted through the health gate, the conversion options are sanitized,
//! a transcoder process is spawned, and the upload is coupled to the
//! process while its output is coupled to the response.
//!
//! The status code is decided by the first output chunk: if the process
//! produces output, the response commits as `200` and any later failure can
//! only truncate the stream; if it exits without output, the stderr excerpt
//! is returned as a structured `500`.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::Extension;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use af_av::{output_filename, SanitizedOptions, TranscodeProcess};
use af_core::Error;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::pipeline::{
    self, capture_stderr, pump_upload, CoupledBody, DiagnosticBuffer,
};

/// `POST /convert/audio` handler.
///
/// Parameters are pulled from a plain string map rather than a typed
/// struct: parameter handling is total, so a duplicated or otherwise odd
/// query key must degrade through sanitization instead of rejecting the
/// request before the handler runs.
pub async fn convert_audio(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<HashMap<String, String>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    convert_inner(ctx, query, multipart)
        .await
        .map_err(|e| AppError::new(e).with_request_id(request_id.0))
}

async fn convert_inner(
    ctx: AppContext,
    query: HashMap<String, String>,
    multipart: Multipart,
) -> af_core::Result<Response> {
    ctx.health.check_admission()?;

    // The upload pump owns the multipart stream and runs independently of
    // the output side, so neither direction can stall the other against a
    // full pipe buffer. It reports the accepted part first, then waits for
    // the process stdin.
    let (meta_tx, meta_rx) = oneshot::channel();
    let (stdin_tx, stdin_rx) = oneshot::channel();
    tokio::spawn(pump_upload(multipart, meta_tx, stdin_rx));

    let meta = meta_rx
        .await
        .map_err(|_| Error::Internal("upload task exited unexpectedly".into()))??;

    let options = SanitizedOptions::sanitize(
        query.get("format").map(String::as_str),
        query.get("bitrate").map(String::as_str),
        query.get("channels").map(String::as_str),
        query.get("ar").map(String::as_str),
    );
    tracing::info!(
        format = %options.format,
        bitrate = %options.bitrate,
        channels = %options.channels,
        sample_rate = %options.sample_rate,
        filename = ?meta.filename,
        "Starting audio conversion"
    );

    let TranscodeProcess {
        stdin,
        mut stdout,
        stderr,
        handle,
    } = ctx.transcoder.spawn(&options)?;

    if stdin_tx.send(stdin).is_err() {
        // Pump already gone (upload aborted); the process sees EOF on its
        // input and exits on its own.
        tracing::debug!("Upload pump exited before stdin handoff");
    }

    let diagnostics = DiagnosticBuffer::new();
    let stderr_task = tokio::spawn(capture_stderr(stderr, diagnostics.clone()));

    // Hold the response until the process shows its hand: the first output
    // chunk commits a 200, EOF without output surfaces the failure.
    let mut first = vec![0u8; 64 * 1024];
    let n = stdout.read(&mut first).await?;

    if n == 0 {
        let exit = handle_wait_logged(handle).await;
        let _ = stderr_task.await;
        let detail = diagnostics.excerpt(pipeline::EXCERPT_MAX_CHARS);
        if exit_failed(&exit) {
            return Err(Error::transcode(detail));
        }
        // Zero-output success (e.g. empty upload): an empty body is still a
        // valid conversion result.
        return respond_with(&options, meta.filename.as_deref(), Body::empty());
    }

    let first = Bytes::copy_from_slice(&first[..n]);
    let cancel = CancellationToken::new();
    tokio::spawn(pipeline::supervise(handle, cancel.clone(), diagnostics));

    let body = CoupledBody::new(first, ReaderStream::new(stdout), cancel);
    respond_with(&options, meta.filename.as_deref(), Body::from_stream(body))
}

async fn handle_wait_logged(
    mut handle: Box<dyn af_av::ProcessHandle>,
) -> Option<af_av::ProcessExit> {
    match handle.wait().await {
        Ok(exit) => Some(exit),
        Err(e) => {
            tracing::warn!("Error awaiting transcoder exit: {e}");
            None
        }
    }
}

fn exit_failed(exit: &Option<af_av::ProcessExit>) -> bool {
    match exit {
        Some(exit) => !exit.success,
        // No observable exit status; treat as failure since no output came.
        None => true,
    }
}

fn respond_with(
    options: &SanitizedOptions,
    original_filename: Option<&str>,
    body: Body,
) -> af_core::Result<Response> {
    let filename = output_filename(original_filename, &options.format);
    let disposition = format!("inline; filename=\"{filename}\"");

    Response::builder()
        .header(header::CONTENT_TYPE, options.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition)
                .map_err(|e| Error::Internal(format!("invalid disposition header: {e}")))?,
        )
        // Disable proxy buffering so output reaches the client as produced.
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| Error::Internal(format!("failed to build response: {e}")))
}
