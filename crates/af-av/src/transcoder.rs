//! Transcoder process supervision.
//!
//! [`Transcoder`] is the narrow seam between the HTTP pipeline and the
//! external process: it spawns one transcoder per request and hands back the
//! three stdio streams plus a [`ProcessHandle`] for awaiting or killing it.
//! The production implementation shells out to ffmpeg; the [`crate::fake`]
//! module provides in-memory implementations for tests.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use crate::options::SanitizedOptions;

/// Exit information for a finished transcoder process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Whether the process exited successfully (code 0).
    pub success: bool,
    /// Raw exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    /// An exit representing success.
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    /// An exit with the given non-zero code.
    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
        }
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Handle for awaiting or terminating a spawned transcoder.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Wait for the process to exit and return its status.
    async fn wait(&mut self) -> std::io::Result<ProcessExit>;

    /// Begin terminating the process without waiting for it to exit.
    fn start_kill(&mut self) -> std::io::Result<()>;
}

/// One spawned transcoder with its three independently addressable streams.
///
/// The streams are boxed so fakes can substitute in-memory pipes. The
/// process must not outlive the request that spawned it; the owning pipeline
/// either waits for exit or kills it via the handle.
pub struct TranscodeProcess {
    /// Write side of the process input channel.
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    /// Read side of the process output channel.
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Read side of the diagnostic (stderr) channel.
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    /// Handle for awaiting or killing the process.
    pub handle: Box<dyn ProcessHandle>,
}

/// Spawns one external transcoder per conversion request.
pub trait Transcoder: Send + Sync {
    /// Spawn a transcoder configured for the given sanitized options.
    ///
    /// # Errors
    ///
    /// Returns [`af_core::Error::Launch`] when the operating system fails to
    /// start the process (executable missing, permission denied). Spawns are
    /// never retried.
    fn spawn(&self, options: &SanitizedOptions) -> af_core::Result<TranscodeProcess>;
}

// ---------------------------------------------------------------------------
// ffmpeg implementation
// ---------------------------------------------------------------------------

/// Production [`Transcoder`] shelling out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    threads: u32,
}

impl FfmpegTranscoder {
    /// Create a transcoder for the given ffmpeg path and `-threads` value.
    pub fn new(program: PathBuf, threads: u32) -> Self {
        Self { program, threads }
    }
}

/// Build the ffmpeg argument list for one conversion.
///
/// Input is read from stdin (`pipe:0`) and output written to stdout
/// (`pipe:1`); the video stream is dropped. Every interpolated value comes
/// from a [`SanitizedOptions`] allow-list.
pub fn build_args(options: &SanitizedOptions, threads: u32) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        "pipe:0".into(),
        "-vn".into(),
        "-ac".into(),
        options.channels.clone(),
        "-ar".into(),
        options.sample_rate.clone(),
        "-b:a".into(),
        options.bitrate.clone(),
        "-acodec".into(),
        options.codec().into(),
        "-f".into(),
        options.format.clone(),
        "-threads".into(),
        threads.to_string(),
        "pipe:1".into(),
    ]
}

impl Transcoder for FfmpegTranscoder {
    fn spawn(&self, options: &SanitizedOptions) -> af_core::Result<TranscodeProcess> {
        let args = build_args(options, self.threads);
        tracing::debug!(?args, "Spawning ffmpeg");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| af_core::Error::launch("ffmpeg", format!("failed to spawn: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| af_core::Error::Internal("ffmpeg stdin not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| af_core::Error::Internal("ffmpeg stdout not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| af_core::Error::Internal("ffmpeg stderr not piped".into()))?;

        Ok(TranscodeProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            handle: Box::new(ChildHandle { child }),
        })
    }
}

/// [`ProcessHandle`] backed by a real OS child process.
struct ChildHandle {
    child: Child,
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        self.child.wait().await.map(ProcessExit::from)
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}
