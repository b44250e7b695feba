//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, resource limits, external tools, and transcode
//! defaults. Every section defaults sensibly so a completely empty `{}` file
//! is valid. Deployment environments can override the most common knobs via
//! environment variables (see [`Config::apply_env`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub tools: ToolsConfig,
    pub transcode: TranscodeConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Override config fields from environment variables.
    ///
    /// Recognized variables: `HOST`, `PORT`, `MAX_UPLOAD_MB`,
    /// `FFMPEG_THREADS`. Values that fail to parse are ignored with a
    /// warning.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring unparseable PORT value '{port}'"),
            }
        }
        if let Ok(mb) = std::env::var("MAX_UPLOAD_MB") {
            match mb.parse::<u64>() {
                Ok(m) => self.limits.max_upload_bytes = m * 1024 * 1024,
                Err(_) => tracing::warn!("Ignoring unparseable MAX_UPLOAD_MB value '{mb}'"),
            }
        }
        if let Ok(threads) = std::env::var("FFMPEG_THREADS") {
            match threads.parse() {
                Ok(t) => self.transcode.threads = t,
                Err(_) => {
                    tracing::warn!("Ignoring unparseable FFMPEG_THREADS value '{threads}'")
                }
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.limits.max_upload_bytes == 0 {
            warnings.push("limits.max_upload_bytes is 0; all uploads will be rejected".into());
        }

        if self.limits.max_event_loop_delay_ms == 0 {
            warnings.push(
                "limits.max_event_loop_delay_ms is 0; every conversion will be rejected".into(),
            );
        }

        if self.transcode.threads == 0 {
            warnings.push("transcode.threads is 0; ffmpeg will pick its own thread count".into());
        }

        if let Some(ref path) = self.tools.ffmpeg_path {
            if !path.exists() {
                warnings.push(format!(
                    "tools.ffmpeg_path '{}' does not exist; falling back to PATH lookup",
                    path.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Resource ceilings: upload size and the admission-control thresholds
/// sampled by the health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted upload body size in bytes.
    pub max_upload_bytes: u64,
    /// Maximum tolerated scheduler delay before new conversions are
    /// rejected.
    pub max_event_loop_delay_ms: u64,
    /// Maximum tolerated resident-set size before new conversions are
    /// rejected.
    pub max_rss_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
            max_event_loop_delay_ms: 1000,
            max_rss_bytes: 500 * 1024 * 1024,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
}

/// Transcoding defaults passed to the external process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Worker thread count handed to ffmpeg via `-threads`.
    pub threads: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self { threads: 2 }
    }
}
