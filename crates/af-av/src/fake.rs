//! In-memory [`Transcoder`] implementations for tests.
//!
//! These let the streaming pipeline be exercised end to end without a real
//! subprocess: an echo transcoder backed by a duplex pipe, a failing
//! transcoder that only emits diagnostics, one that refuses to spawn, and a
//! spy wrapper that records spawn calls.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::options::SanitizedOptions;
use crate::transcoder::{ProcessExit, ProcessHandle, TranscodeProcess, Transcoder};

/// Handle that resolves immediately with a fixed exit status.
struct FixedExitHandle {
    exit: ProcessExit,
}

#[async_trait]
impl ProcessHandle for FixedExitHandle {
    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        Ok(self.exit)
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Transcoder whose process copies stdin to stdout unmodified and exits 0.
#[derive(Debug, Default)]
pub struct EchoTranscoder;

impl Transcoder for EchoTranscoder {
    fn spawn(&self, _options: &SanitizedOptions) -> af_core::Result<TranscodeProcess> {
        // Bytes written to one end become readable from the other, so
        // handing out (write half, read half) of a duplex pipe behaves like
        // a process that echoes stdin on stdout. The 64 KiB buffer also
        // reproduces pipe backpressure.
        let (stdin, stdout) = tokio::io::duplex(64 * 1024);

        Ok(TranscodeProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(tokio::io::empty()),
            handle: Box::new(FixedExitHandle {
                exit: ProcessExit::ok(),
            }),
        })
    }
}

/// Transcoder whose process produces no output, writes the given text to its
/// diagnostic channel, and exits with the given non-zero code.
#[derive(Debug, Clone)]
pub struct FailingTranscoder {
    stderr_text: String,
    exit_code: i32,
}

impl FailingTranscoder {
    pub fn new(stderr_text: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stderr_text: stderr_text.into(),
            exit_code,
        }
    }
}

impl Transcoder for FailingTranscoder {
    fn spawn(&self, _options: &SanitizedOptions) -> af_core::Result<TranscodeProcess> {
        Ok(TranscodeProcess {
            stdin: Box::new(tokio::io::sink()),
            stdout: Box::new(tokio::io::empty()),
            stderr: Box::new(Cursor::new(self.stderr_text.clone().into_bytes())),
            handle: Box::new(FixedExitHandle {
                exit: ProcessExit::failed(self.exit_code),
            }),
        })
    }
}

/// Transcoder that fails to spawn, as if the executable were missing.
#[derive(Debug, Default)]
pub struct UnavailableTranscoder;

impl Transcoder for UnavailableTranscoder {
    fn spawn(&self, _options: &SanitizedOptions) -> af_core::Result<TranscodeProcess> {
        Err(af_core::Error::launch(
            "ffmpeg",
            "failed to spawn: No such file or directory (os error 2)",
        ))
    }
}

/// Wrapper recording every spawn call and the options it carried.
pub struct SpyTranscoder {
    inner: Arc<dyn Transcoder>,
    spawns: AtomicUsize,
    seen: Mutex<Vec<SanitizedOptions>>,
}

impl SpyTranscoder {
    pub fn new(inner: Arc<dyn Transcoder>) -> Self {
        Self {
            inner,
            spawns: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of spawn calls observed so far.
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Options passed to each observed spawn call.
    pub fn seen_options(&self) -> Vec<SanitizedOptions> {
        self.seen.lock().clone()
    }
}

impl Transcoder for SpyTranscoder {
    fn spawn(&self, options: &SanitizedOptions) -> af_core::Result<TranscodeProcess> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(options.clone());
        self.inner.spawn(options)
    }
}
