//! Tool-free engine that echoes its input as the artifact.
//!
//! Selected with `transform.engine = "passthrough"` to run the whole
//! pipeline on hosts without ffmpeg.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tf_core::{Branch, Result};

use crate::engine::{TransformEngine, TransformOutput, TransformSpec};

/// Copies the input bytes to the output unchanged.
#[derive(Debug, Default)]
pub struct PassthroughEngine {
    warmup: Duration,
    fail_branches: Vec<Branch>,
    prepared: AtomicBool,
}

impl PassthroughEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay [`prepare`](TransformEngine::prepare) by `warmup`.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Make every transform for `branch` exit with code 1.
    pub fn failing(mut self, branch: Branch) -> Self {
        self.fail_branches.push(branch);
        self
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransformEngine for PassthroughEngine {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn prepare(&self) -> Result<()> {
        if !self.warmup.is_zero() {
            tokio::time::sleep(self.warmup).await;
        }
        self.prepared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn run_to_completion(&self, spec: TransformSpec) -> Result<TransformOutput> {
        if self.fail_branches.contains(&spec.branch) {
            return Ok(TransformOutput {
                exit_code: Some(1),
                output: None,
                logs: format!("{}: simulated transform failure", spec.input_name),
            });
        }
        Ok(TransformOutput {
            exit_code: Some(0),
            output: Some(spec.input),
            logs: format!("copied {} to {}", spec.input_name, spec.output_name),
        })
    }
}
