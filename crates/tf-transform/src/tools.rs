//! External tool detection.
//!
//! Branch workers depend on a single tool, ffmpeg. [`locate`] resolves it
//! from a configured path or `PATH`, and [`check`] reports its version for
//! the CLI and health endpoint.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Availability information for a tool.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// First line of `-version` output, if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    #[schema(value_type = Option<String>)]
    pub path: Option<PathBuf>,
}

/// Resolve `name`, preferring `custom` when it points at an existing file.
pub fn locate(name: &str, custom: Option<&Path>) -> Option<PathBuf> {
    match custom {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!(
                tool = %name,
                path = %p.display(),
                "Configured tool path does not exist; searching PATH"
            );
            which::which(name).ok()
        }
        None => which::which(name).ok(),
    }
}

/// Run `<path> -version` and return the first line of stdout.
pub async fn detect_version(path: &Path) -> Option<String> {
    let output = ToolCommand::new(path.to_path_buf())
        .arg("-version")
        .execute_checked()
        .await
        .ok()?;
    output.stdout.lines().next().map(|s| s.to_string())
}

/// Locate `name` and report whether it is usable.
pub async fn check(name: &str, custom: Option<&Path>) -> ToolInfo {
    match locate(name, custom) {
        Some(path) => ToolInfo {
            name: name.to_string(),
            available: true,
            version: detect_version(&path).await,
            path: Some(path),
        },
        None => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}
