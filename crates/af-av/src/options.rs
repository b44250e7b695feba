//! Conversion parameter sanitization.
//!
//! Query parameters arrive as attacker-controlled strings and every one of
//! them ends up in the ffmpeg argument list, so each field is projected onto
//! a closed allow-list before use. Invalid values silently degrade to a safe
//! default rather than rejecting the request; sanitization is total and
//! never fails.

/// Default output format when the requested one sanitizes to nothing.
pub const DEFAULT_FORMAT: &str = "mp3";
/// Default audio bitrate.
pub const DEFAULT_BITRATE: &str = "192k";
/// Default channel count.
pub const DEFAULT_CHANNELS: &str = "2";
/// Default sample rate.
pub const DEFAULT_SAMPLE_RATE: &str = "44100";

/// Sample rates accepted verbatim; anything else becomes the default.
const ALLOWED_SAMPLE_RATES: &[&str] = &["32000", "44100", "48000"];

/// Conversion options with every field guaranteed to match its allow-list.
///
/// The format is only normalized, not checked against what the transcoder
/// can actually encode; an unencodable format surfaces later as a process
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedOptions {
    /// Output container/codec family, lowercase alphanumeric.
    pub format: String,
    /// Audio bitrate matching `^[0-9]{2,4}k$`.
    pub bitrate: String,
    /// Channel count, `"1"` or `"2"`.
    pub channels: String,
    /// Sample rate in Hz, one of 32000/44100/48000.
    pub sample_rate: String,
}

impl SanitizedOptions {
    /// Sanitize raw query parameters into a guaranteed-safe option set.
    pub fn sanitize(
        format: Option<&str>,
        bitrate: Option<&str>,
        channels: Option<&str>,
        sample_rate: Option<&str>,
    ) -> Self {
        Self {
            format: sanitize_format(format.unwrap_or_default()),
            bitrate: sanitize_bitrate(bitrate.unwrap_or_default()),
            channels: sanitize_channels(channels.unwrap_or_default()),
            sample_rate: sanitize_sample_rate(sample_rate.unwrap_or_default()),
        }
    }

    /// Audio codec flag value for the sanitized format.
    pub fn codec(&self) -> &'static str {
        match self.format.as_str() {
            "aac" => "aac",
            "ogg" => "libvorbis",
            // mp3 and anything else the caller dreamt up.
            _ => "libmp3lame",
        }
    }

    /// Response content type derived from the sanitized format.
    pub fn content_type(&self) -> String {
        format!("audio/{}", self.format)
    }
}

impl Default for SanitizedOptions {
    fn default() -> Self {
        Self::sanitize(None, None, None, None)
    }
}

/// Strip to ASCII alphanumerics and lowercase; empty result falls back to
/// the default format.
fn sanitize_format(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    if stripped.is_empty() {
        DEFAULT_FORMAT.to_string()
    } else {
        stripped
    }
}

/// Accept `^[0-9]{2,4}k$`, otherwise fall back to the default bitrate.
fn sanitize_bitrate(raw: &str) -> String {
    let digits = raw.strip_suffix('k').unwrap_or("");
    if (2..=4).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
        raw.to_string()
    } else {
        DEFAULT_BITRATE.to_string()
    }
}

fn sanitize_channels(raw: &str) -> String {
    match raw {
        "1" | "2" => raw.to_string(),
        _ => DEFAULT_CHANNELS.to_string(),
    }
}

fn sanitize_sample_rate(raw: &str) -> String {
    if ALLOWED_SAMPLE_RATES.contains(&raw) {
        raw.to_string()
    } else {
        DEFAULT_SAMPLE_RATE.to_string()
    }
}

/// Derive the suggested output filename from the uploaded one: swap the
/// extension for the sanitized format, defaulting to `input.<format>` when
/// no filename was supplied.
///
/// The result goes into a `Content-Disposition` header, so characters that
/// are not alphanumeric, `.`, `_`, or `-` are replaced with `_`.
pub fn output_filename(original: Option<&str>, format: &str) -> String {
    let original = match original {
        Some(name) if !name.is_empty() => sanitize_filename(name),
        _ => format!("input.{format}"),
    };

    let base = match original.rfind('.') {
        Some(idx) => &original[..idx],
        None => original.as_str(),
    };
    format!("{base}.{format}")
}

fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
