//! The [`TransformEngine`] trait: run one media transform to completion.

use async_trait::async_trait;
use bytes::Bytes;

use tf_core::{Branch, Result};

/// Placeholder replaced with the input file path in [`TransformSpec::args`].
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced with the output file path in [`TransformSpec::args`].
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Everything an engine needs to produce one artifact.
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub branch: Branch,
    /// File name the input is materialised under.
    pub input_name: String,
    pub input: Bytes,
    /// File name the engine must write.
    pub output_name: String,
    /// Tool arguments with [`INPUT_PLACEHOLDER`] and [`OUTPUT_PLACEHOLDER`].
    pub args: Vec<String>,
}

/// What a finished transform left behind.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Artifact bytes; `None` if the tool failed or wrote nothing.
    pub output: Option<Bytes>,
    /// Diagnostic output (stderr for ffmpeg).
    pub logs: String,
}

impl TransformOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.output.is_some()
    }

    /// One-line reason for a failed transform.
    pub fn failure_reason(&self) -> String {
        let tail = self
            .logs
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim();
        match (self.exit_code, self.output.is_some()) {
            (Some(0), false) => "transform produced no output".to_string(),
            (Some(code), _) if tail.is_empty() => format!("transform exited with code {code}"),
            (Some(code), _) => format!("transform exited with code {code}: {tail}"),
            (None, _) => "transform was terminated by a signal".to_string(),
        }
    }
}

/// A media transform backend.
///
/// Implementations must be ready to serve [`run_to_completion`] only after
/// [`prepare`] has returned `Ok`.
///
/// [`run_to_completion`]: TransformEngine::run_to_completion
/// [`prepare`]: TransformEngine::prepare
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// A short, human-readable name (e.g. "ffmpeg").
    fn name(&self) -> &'static str;

    /// Make the engine usable: locate binaries, warm caches. Idempotent.
    async fn prepare(&self) -> Result<()>;

    /// Run a transform and wait for it to finish.
    ///
    /// A tool that runs but fails is reported through
    /// [`TransformOutput::exit_code`]; `Err` means the tool could not be run
    /// at all.
    async fn run_to_completion(&self, spec: TransformSpec) -> Result<TransformOutput>;
}
