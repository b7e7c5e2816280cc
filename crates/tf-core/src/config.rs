//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the HTTP surface, storage, channels, routing, transforms,
//! the join barrier, consumers and mail. Every section defaults sensibly so a
//! completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::model::{Branch, BranchSet};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub channels: ChannelsConfig,
    pub routing: RoutingConfig,
    pub transform: TransformConfig,
    pub join: JoinConfig,
    pub consumer: ConsumerConfig,
    pub mail: MailConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is string-based so the caller can read the file however it sees
    /// fit.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read and parse a config file, failing on any error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
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

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.storage.container.trim().is_empty() {
            warnings.push("storage.container is empty".into());
        }

        if self.channels.partitions == 0 {
            warnings.push("channels.partitions is 0; one partition will be used".into());
        }

        let routing = &self.routing;
        if routing.image_extensions.is_empty() && routing.video_extensions.is_empty() {
            warnings.push("routing allows no extensions; every upload is unsupported".into());
        }
        for ext in routing.video_extensions.iter() {
            if routing.image_extensions.iter().any(|i| i.eq_ignore_ascii_case(ext)) {
                warnings.push(format!(
                    "routing extension '{ext}' is listed as both image and video; video wins"
                ));
            }
        }
        if routing.image_branches.is_empty() {
            warnings.push("routing.image_branches is empty; image jobs would never join".into());
        }
        if routing.video_branches.is_empty() {
            warnings.push("routing.video_branches is empty; video jobs would never join".into());
        }

        if !matches!(self.transform.engine.as_str(), "ffmpeg" | "passthrough") {
            warnings.push(format!(
                "transform.engine '{}' is not recognized (valid: ffmpeg, passthrough)",
                self.transform.engine
            ));
        }
        if self.transform.width == 0 {
            warnings.push("transform.width is 0".into());
        }

        if self.join.timeout_secs == 0 {
            warnings.push("join.timeout_secs is 0; every partial join expires at once".into());
        }
        if self.join.tombstone_secs < self.join.timeout_secs {
            warnings.push(
                "join.tombstone_secs is shorter than join.timeout_secs; late duplicates may reopen retired jobs"
                    .into(),
            );
        }

        if self.consumer.max_attempts == 0 {
            warnings.push("consumer.max_attempts is 0; one attempt will be made".into());
        }

        if let Some(ref url) = self.mail.relay_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(format!("mail.relay_url '{url}' is not an http(s) URL"));
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
    /// Largest accepted multipart upload.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the filesystem store. `None` keeps blobs in memory.
    pub root: Option<PathBuf>,
    /// Container holding uploads and generated artifacts.
    pub container: String,
    /// Public base URL used when rendering object links.
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: Some(PathBuf::from("./data/blobs")),
            container: "batchprocessingthumbnailgenerator".into(),
            public_base_url: None,
        }
    }
}

/// Event channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Partitions per channel.
    pub partitions: u32,
    /// Capacity of the activity broadcast channel.
    pub event_capacity: usize,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            partitions: 2,
            event_capacity: 256,
        }
    }
}

/// Extension allow-lists and the branch set each route fans out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub image_branches: Vec<Branch>,
    pub video_branches: Vec<Branch>,
}

impl RoutingConfig {
    pub fn image_branch_set(&self) -> BranchSet {
        self.image_branches.iter().copied().collect()
    }

    pub fn video_branch_set(&self) -> BranchSet {
        self.video_branches.iter().copied().collect()
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            image_extensions: ["gif", "jpg", "jpeg", "png"]
                .into_iter()
                .map(String::from)
                .collect(),
            video_extensions: ["mp4", "avi", "mpg"].into_iter().map(String::from).collect(),
            image_branches: vec![Branch::Thumbnail],
            video_branches: vec![Branch::FrameCapture, Branch::AnimatedGif],
        }
    }
}

/// External transform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Engine backing the branch workers: `ffmpeg` or `passthrough`.
    pub engine: String,
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default = "default_transform_timeout")]
    pub timeout_secs: u64,
    /// Output width in pixels; height keeps the aspect ratio.
    pub width: u32,
    /// Offset into the video for the captured frame.
    pub frame_offset: String,
}

fn default_transform_timeout() -> u64 {
    300
}

impl TransformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            engine: "ffmpeg".into(),
            ffmpeg_path: None,
            timeout_secs: default_transform_timeout(),
            width: 120,
            frame_offset: "00:00:01".into(),
        }
    }
}

/// Join barrier deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// A partial join older than this is expired with a failure notification.
    pub timeout_secs: u64,
    /// How often stalled joins and old tombstones are swept.
    pub sweep_interval_secs: u64,
    /// How long a retired job is remembered to drop late duplicates.
    pub tombstone_secs: u64,
}

impl JoinConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_secs)
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            sweep_interval_secs: 30,
            tombstone_secs: 3600,
        }
    }
}

/// Channel consumer retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff_ms: 500,
        }
    }
}

/// Outbound mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from: String,
    /// HTTP mail relay endpoint. Without one, messages are written to the log.
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "thumbforge@localhost".into(),
            relay_url: None,
            relay_token: None,
        }
    }
}
