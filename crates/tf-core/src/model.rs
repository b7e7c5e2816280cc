//! Pipeline message model.
//!
//! Every type here crosses a channel boundary as JSON. A job fans out into
//! one [`BranchRequest`] per branch, each branch answers with exactly one
//! [`BranchCompletion`], and the join (or the unsupported-format short
//! circuit) produces a single [`NotifyEvent`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::JobId;

/// Channel carrying join output and short-circuit error events.
pub const NOTIFY_CHANNEL: &str = "notifyevent";

/// Error tag for files outside the extension allow-list.
pub const UNSUPPORTED_FORMAT: &str = "UNSUPPORTED FORMAT";

/// Error tag for jobs where at least one branch reported failure.
pub const PROCESSING_FAILED: &str = "PROCESSING FAILED";

/// Error tag for jobs evicted by the join deadline.
pub const TIMED_OUT: &str = "TIMED OUT";

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// One independent unit of asynchronous processing a job may require.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Scaled still image of an image upload.
    Thumbnail,
    /// Single frame grabbed from a video.
    FrameCapture,
    /// Scaled animated GIF preview of a video.
    AnimatedGif,
}

impl Branch {
    /// Every branch, in declaration order.
    pub const ALL: [Branch; 3] = [Branch::Thumbnail, Branch::FrameCapture, Branch::AnimatedGif];

    /// Stable snake_case tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Thumbnail => "thumbnail",
            Branch::FrameCapture => "frame_capture",
            Branch::AnimatedGif => "animated_gif",
        }
    }

    /// Channel the dispatcher publishes requests for this branch to.
    pub fn input_channel(&self) -> &'static str {
        match self {
            Branch::Thumbnail => "thumbnailevent",
            Branch::FrameCapture => "framecaptureevent",
            Branch::AnimatedGif => "animatedgifevent",
        }
    }

    /// Channel the branch worker publishes its completion to.
    pub fn completion_channel(&self) -> &'static str {
        match self {
            Branch::Thumbnail => "thumbnailreadyevent",
            Branch::FrameCapture => "framecapturereadyevent",
            Branch::AnimatedGif => "animatedgifreadyevent",
        }
    }

    /// Name of the artifact this branch derives from `file_name`.
    ///
    /// The source extension is replaced, so `clip.mp4` becomes `clip.gif`
    /// for the animated preview.
    pub fn artifact_name(&self, file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        match self {
            Branch::Thumbnail => format!("{stem}_thumb.png"),
            Branch::FrameCapture => format!("{stem}_frame.png"),
            Branch::AnimatedGif => format!("{stem}.gif"),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "thumbnail" => Ok(Branch::Thumbnail),
            "frame_capture" | "framecapture" => Ok(Branch::FrameCapture),
            "animated_gif" | "animatedgif" | "animated_preview" => Ok(Branch::AnimatedGif),
            other => Err(Error::Validation(format!("unknown branch '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// BranchSet
// ---------------------------------------------------------------------------

/// The explicit set of branches a job must hear back from before it joins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchSet(BTreeSet<Branch>);

impl BranchSet {
    /// A set holding a single branch.
    pub fn single(branch: Branch) -> Self {
        Self(BTreeSet::from([branch]))
    }

    pub fn contains(&self, branch: Branch) -> bool {
        self.0.contains(&branch)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Branch> + '_ {
        self.0.iter().copied()
    }

    /// Branches in `self` that are not in `other`.
    pub fn missing_from<'a, I>(&self, received: I) -> Vec<Branch>
    where
        I: IntoIterator<Item = &'a Branch>,
    {
        let received: BTreeSet<Branch> = received.into_iter().copied().collect();
        self.0.difference(&received).copied().collect()
    }
}

impl FromIterator<Branch> for BranchSet {
    fn from_iter<T: IntoIterator<Item = Branch>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for BranchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.0.iter().map(Branch::as_str).collect();
        f.write_str(&tags.join("+"))
    }
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Classification outcome for a submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Extension outside the allow-list; goes straight to notification.
    Unsupported,
    /// Image or other allowed non-video file.
    Image,
    /// Video file.
    Video,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Route::Unsupported => "unsupported",
            Route::Image => "image",
            Route::Video => "video",
        })
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A stored, classified submission ready for fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Display name of the upload as supplied by the client.
    pub file_name: String,
    /// Address notified once the job resolves.
    pub email: String,
    /// Object name of the raw upload inside the job container.
    pub object: String,
    /// Branches the join waits for (empty for unsupported files).
    pub expected: BranchSet,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build the request a branch worker consumes.
    pub fn request_for(&self, branch: Branch) -> BranchRequest {
        BranchRequest {
            job_id: self.id,
            file_name: self.file_name.clone(),
            email: self.email.clone(),
            object: self.object.clone(),
            branch,
            expected: self.expected.clone(),
            submitted_at: self.created_at,
        }
    }
}

/// Object name under which a job's files are stored.
///
/// Every job gets its own prefix so uploads sharing a file name never
/// overwrite each other.
pub fn object_name(job_id: JobId, file_name: &str) -> String {
    format!("{job_id}/{file_name}")
}

// ---------------------------------------------------------------------------
// Channel messages
// ---------------------------------------------------------------------------

/// Work item published to a branch input channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRequest {
    pub job_id: JobId,
    pub file_name: String,
    pub email: String,
    pub object: String,
    pub branch: Branch,
    pub expected: BranchSet,
    pub submitted_at: DateTime<Utc>,
}

impl BranchRequest {
    /// The completion this request resolves to.
    pub fn complete(&self, outcome: BranchOutcome) -> BranchCompletion {
        BranchCompletion {
            job_id: self.job_id,
            file_name: self.file_name.clone(),
            email: self.email.clone(),
            branch: self.branch,
            expected: self.expected.clone(),
            outcome,
        }
    }
}

/// Result of one branch's external transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome {
    Succeeded { artifact: String },
    Failed { reason: String },
}

impl BranchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BranchOutcome::Succeeded { .. })
    }
}

/// Immutable record published once per branch per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchCompletion {
    pub job_id: JobId,
    pub file_name: String,
    pub email: String,
    pub branch: Branch,
    pub expected: BranchSet,
    pub outcome: BranchOutcome,
}

/// A branch that did not produce its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFailure {
    pub branch: Branch,
    pub reason: String,
}

/// Terminal event for a job, consumed by the notification emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub job_id: JobId,
    pub file_name: String,
    pub email: String,
    /// `None` when every expected branch succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub failures: Vec<BranchFailure>,
}

impl NotifyEvent {
    /// Short-circuit event for a file outside the allow-list.
    pub fn unsupported(job: &Job) -> Self {
        Self {
            job_id: job.id,
            file_name: job.file_name.clone(),
            email: job.email.clone(),
            error: Some(UNSUPPORTED_FORMAT.to_string()),
            artifacts: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
