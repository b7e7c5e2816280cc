//! Per-branch ffmpeg argument templates.

use tf_core::Branch;

use crate::engine::{INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};

/// Knobs shared by every recipe.
#[derive(Debug, Clone)]
pub struct RecipeOptions {
    /// Output width in pixels; height follows the aspect ratio.
    pub width: u32,
    /// Seek position for the captured frame, as an ffmpeg time string.
    pub frame_offset: String,
}

impl Default for RecipeOptions {
    fn default() -> Self {
        Self {
            width: 120,
            frame_offset: "00:00:01".into(),
        }
    }
}

/// ffmpeg arguments producing `branch`'s artifact.
pub fn ffmpeg_args(branch: Branch, opts: &RecipeOptions) -> Vec<String> {
    let scale = format!("scale={}:-1", opts.width);
    let args: Vec<&str> = match branch {
        Branch::Thumbnail => vec![
            "-y",
            "-i",
            INPUT_PLACEHOLDER,
            "-vf",
            scale.as_str(),
            "-frames:v",
            "1",
            OUTPUT_PLACEHOLDER,
        ],
        Branch::FrameCapture => vec![
            "-y",
            "-ss",
            opts.frame_offset.as_str(),
            "-i",
            INPUT_PLACEHOLDER,
            "-frames:v",
            "1",
            "-vf",
            scale.as_str(),
            OUTPUT_PLACEHOLDER,
        ],
        Branch::AnimatedGif => vec!["-y", "-i", INPUT_PLACEHOLDER, "-vf", scale.as_str(), OUTPUT_PLACEHOLDER],
    };
    args.into_iter().map(String::from).collect()
}

/// Replace the input and output placeholders.
pub fn render(args: &[String], input: &str, output: &str) -> Vec<String> {
    args.iter()
        .map(|a| a.replace(INPUT_PLACEHOLDER, input).replace(OUTPUT_PLACEHOLDER, output))
        .collect()
}
