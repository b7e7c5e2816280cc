//! ffmpeg-backed [`TransformEngine`].
//!
//! Each run gets a private temporary directory: the input is written there,
//! ffmpeg runs with that directory as its working directory, and the output
//! file is read back before the directory is removed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;

use tf_core::{Error, Result};

use crate::command::ToolCommand;
use crate::engine::{TransformEngine, TransformOutput, TransformSpec};
use crate::recipe::render;
use crate::tools;

const TOOL: &str = "ffmpeg";

/// Runs transforms with a locally installed ffmpeg.
pub struct FfmpegEngine {
    configured_path: Option<PathBuf>,
    timeout: Duration,
    resolved: OnceCell<PathBuf>,
}

impl FfmpegEngine {
    pub fn new(configured_path: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            configured_path,
            timeout,
            resolved: OnceCell::new(),
        }
    }

    async fn binary(&self) -> Result<&PathBuf> {
        self.resolved
            .get_or_try_init(|| async move {
                let path = tools::locate(TOOL, self.configured_path.as_deref()).ok_or_else(|| {
                    Error::tool(TOOL, "ffmpeg not found; is it installed and in PATH?")
                })?;
                let version = tools::detect_version(&path).await;
                tracing::info!(
                    path = %path.display(),
                    version = version.as_deref().unwrap_or("unknown version"),
                    "ffmpeg ready"
                );
                Ok::<PathBuf, Error>(path)
            })
            .await
    }
}

/// Keep only the final path component so a crafted name cannot escape the
/// work directory.
fn local_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "..")
        .unwrap_or_else(|| fallback.to_string())
}

#[async_trait]
impl TransformEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        TOOL
    }

    async fn prepare(&self) -> Result<()> {
        self.binary().await.map(|_| ())
    }

    async fn run_to_completion(&self, spec: TransformSpec) -> Result<TransformOutput> {
        let binary = self.binary().await?.clone();

        let workdir = tempfile::tempdir()
            .map_err(|e| Error::tool(TOOL, format!("failed to create temp dir: {e}")))?;

        let input_name = local_name(&spec.input_name, "input");
        let mut output_name = local_name(&spec.output_name, "output");
        if output_name == input_name {
            output_name = format!("out_{output_name}");
        }
        let input_path = workdir.path().join(&input_name);
        let output_path = workdir.path().join(&output_name);

        tokio::fs::write(&input_path, &spec.input).await?;

        let args = render(
            &spec.args,
            &input_path.to_string_lossy(),
            &output_path.to_string_lossy(),
        );

        let out = ToolCommand::new(binary)
            .args(args)
            .timeout(self.timeout)
            .current_dir(workdir.path())
            .execute()
            .await?;

        let output = if out.status.success() {
            match tokio::fs::read(&output_path).await {
                Ok(data) => Some(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        tracing::debug!(
            branch = %spec.branch,
            exit_code = ?out.code(),
            output_bytes = output.as_ref().map(|b| b.len()).unwrap_or(0),
            "ffmpeg finished"
        );

        Ok(TransformOutput {
            exit_code: out.code(),
            output,
            logs: out.stderr,
        })
    }
}
