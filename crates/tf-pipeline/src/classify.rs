//! File-extension classification.
//!
//! The allow-list check runs first: anything it rejects is
//! [`Route::Unsupported`] regardless of the video list. Only then is the
//! video subset consulted.

use regex::Regex;

use tf_core::config::RoutingConfig;
use tf_core::{BranchSet, Error, Result, Route};

/// Result of classifying a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub route: Route,
    /// Branches to fan out to; empty for [`Route::Unsupported`].
    pub branches: BranchSet,
}

/// Routes file names by extension.
#[derive(Debug, Clone)]
pub struct Classifier {
    allowed: Regex,
    video: Regex,
    image_branches: BranchSet,
    video_branches: BranchSet,
}

/// Case-insensitive pattern matching a name that ends in one of
/// `extensions`, with at least one non-space character before the dot.
fn extension_pattern<'a>(extensions: impl IntoIterator<Item = &'a String>) -> Result<Regex> {
    let alternatives: Vec<String> = extensions
        .into_iter()
        .map(|e| e.trim().trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .map(regex::escape)
        .collect();

    // An empty alternation would match every name; use a pattern that
    // matches nothing instead.
    let pattern = if alternatives.is_empty() {
        r"[^\s\S]".to_string()
    } else {
        format!(r"(?i)[^\s]+\.({})$", alternatives.join("|"))
    };

    Regex::new(&pattern).map_err(|e| Error::Validation(format!("invalid extension list: {e}")))
}

impl Classifier {
    pub fn from_config(routing: &RoutingConfig) -> Result<Self> {
        let allowed =
            extension_pattern(routing.image_extensions.iter().chain(&routing.video_extensions))?;
        let video = extension_pattern(&routing.video_extensions)?;
        Ok(Self {
            allowed,
            video,
            image_branches: routing.image_branch_set(),
            video_branches: routing.video_branch_set(),
        })
    }

    pub fn classify(&self, file_name: &str) -> Classification {
        if !self.allowed.is_match(file_name) {
            return Classification {
                route: Route::Unsupported,
                branches: BranchSet::default(),
            };
        }
        if self.video.is_match(file_name) {
            Classification {
                route: Route::Video,
                branches: self.video_branches.clone(),
            }
        } else {
            Classification {
                route: Route::Image,
                branches: self.image_branches.clone(),
            }
        }
    }
}
