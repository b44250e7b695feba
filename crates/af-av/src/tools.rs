//! External tool discovery.
//!
//! Locates the ffmpeg executable, preferring an explicit path from config
//! and falling back to a `PATH` lookup.

use std::path::{Path, PathBuf};

use af_core::config::ToolsConfig;

/// Resolve the ffmpeg executable.
///
/// A configured path is used when it exists; otherwise `PATH` is searched.
///
/// # Errors
///
/// Returns [`af_core::Error::Launch`] when ffmpeg cannot be found at all.
pub fn resolve_ffmpeg(tools_config: &ToolsConfig) -> af_core::Result<PathBuf> {
    if let Some(ref path) = tools_config.ffmpeg_path {
        if path.exists() {
            return Ok(path.clone());
        }
        tracing::warn!(
            "Configured ffmpeg path {} does not exist; searching PATH",
            path.display()
        );
    }

    which::which("ffmpeg").map_err(|_| {
        af_core::Error::launch("ffmpeg", "ffmpeg not found; is it installed and in PATH?")
    })
}

/// Run `ffmpeg -version` and return the first line of stdout.
pub fn ffmpeg_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_path_falls_back_to_path_lookup() {
        let cfg = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
        };
        // Whether this succeeds depends on the environment; it must not
        // return the bogus configured path.
        if let Ok(path) = resolve_ffmpeg(&cfg) {
            assert_ne!(path, PathBuf::from("/nonexistent/ffmpeg"));
        }
    }

    #[test]
    fn version_of_nonexistent_tool_is_none() {
        assert_eq!(ffmpeg_version(Path::new("/nonexistent/ffmpeg")), None);
    }
}
