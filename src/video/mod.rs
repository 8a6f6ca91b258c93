//! Video generation: provider adapters, task types and the poll loop.

mod adapter;
mod poller;
pub mod providers;
mod types;

pub use adapter::{
    adapter_for, normalize_sora_duration, normalize_status, validate_image_source, VideoAdapter,
};
pub(crate) use poller::VideoTaskSource;
pub use poller::{
    PollOptions, ProgressCallback, StatusSource, TaskPoller, DEFAULT_ETA_GRACE,
    DEFAULT_MAX_TRANSIENT_ERRORS, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT,
};
pub use types::{
    AspectRatio, ImageToVideoRequest, TaskHandle, TaskState, TaskStatus, TextToVideoRequest,
    DEFAULT_IMAGE_TO_VIDEO_DURATION,
};
