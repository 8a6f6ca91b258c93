//! Core types for video generation tasks.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Requested duration, in seconds, when an image-to-video caller gives none.
pub const DEFAULT_IMAGE_TO_VIDEO_DURATION: u32 = 5;

/// Output aspect ratio for text-to-video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 16:9 landscape.
    #[serde(rename = "16:9")]
    Landscape,
    /// 9:16 portrait.
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    /// Returns the aspect ratio as a string (e.g., "9:16").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = crate::error::EffigyError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim() {
            "16:9" => Ok(Self::Landscape),
            "9:16" => Ok(Self::Portrait),
            other => Err(crate::error::EffigyError::Validation(format!(
                "unsupported aspect ratio: {other} (expected 16:9 or 9:16)"
            ))),
        }
    }
}

/// A request to animate an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageToVideoRequest {
    /// The text prompt describing the effect.
    pub prompt: String,
    /// Public http(s) URL, or a base64 data URI where the provider accepts one.
    pub image_source: String,
    /// Requested duration in seconds, before provider normalization.
    pub duration_secs: Option<u32>,
}

impl ImageToVideoRequest {
    /// Creates a request with the default duration.
    pub fn new(prompt: impl Into<String>, image_source: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_source: image_source.into(),
            duration_secs: Some(DEFAULT_IMAGE_TO_VIDEO_DURATION),
        }
    }

    /// Sets the requested duration.
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// A request to generate a video from text only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextToVideoRequest {
    /// The text prompt describing the video.
    pub prompt: String,
    /// Requested duration in seconds, before provider normalization.
    pub duration_secs: Option<u32>,
    /// Output aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// Whether the result should be private on the provider side.
    pub private: bool,
}

impl TextToVideoRequest {
    /// Creates a private, portrait request.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            duration_secs: None,
            aspect_ratio: AspectRatio::default(),
            private: true,
        }
    }

    /// Sets the requested duration.
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Sets the privacy flag.
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }
}

/// Opaque provider-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Wraps a provider task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical task state, whatever the provider calls it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted, not started.
    Pending,
    /// Running.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error, or cancelled.
    Failed,
}

impl TaskState {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized status observation. Produced fresh on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Provider task identifier.
    pub task_id: String,
    /// Canonical state.
    pub state: TaskState,
    /// Progress percentage (0-100), if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Server estimate of total generation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<Duration>,
    /// Result URL; only set when `state` is `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Failure message; only set when `state` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskStatus {
    /// Creates a non-terminal status.
    pub fn new(task_id: impl Into<String>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            progress: None,
            estimated_time: None,
            result_url: None,
            error: None,
        }
    }

    /// Creates a completed status. `url` may be absent if the body had none.
    pub fn completed(task_id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            result_url: url,
            ..Self::new(task_id, TaskState::Completed)
        }
    }

    /// Creates a failed status.
    pub fn failed(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(task_id, TaskState::Failed)
        }
    }

    /// Sets the progress percentage.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Sets the server time estimate.
    pub fn with_estimated_time(mut self, eta: Duration) -> Self {
        self.estimated_time = Some(eta);
        self
    }
}
