//! # af-av
//!
//! Subprocess side of the audioforge pipeline.
//!
//! This crate provides:
//!
//! - **Parameter sanitization** ([`SanitizedOptions`]) -- project untrusted
//!   query parameters onto a closed set of values safe to pass to ffmpeg.
//! - **Process supervision** ([`Transcoder`], [`FfmpegTranscoder`]) -- spawn
//!   the external transcoder with piped stdio and expose its streams behind
//!   a narrow, fakeable interface.
//! - **Tool discovery** ([`tools`]) -- locate ffmpeg via config override or
//!   `PATH`.
//! - **In-memory fakes** ([`fake`]) -- transcoders backed by duplex pipes
//!   for exercising the streaming pipeline without a real subprocess.

pub mod fake;
pub mod options;
pub mod tools;
pub mod transcoder;

pub use options::{output_filename, SanitizedOptions};
pub use tools::{ffmpeg_version, resolve_ffmpeg};
pub use transcoder::{FfmpegTranscoder, ProcessExit, ProcessHandle, TranscodeProcess, Transcoder};
