#![warn(missing_docs)]
//! Effigy - remote image and video generation task client.
//!
//! This crate creates long-running generation jobs against third-party
//! HTTP APIs, polls them to a terminal state, and returns the result URL
//! or a classified error.
//!
//! # Quick Start - Image to Video
//!
//! ```no_run
//! use effigy::{GenerationClient, ModelConfig, ProgressStage};
//!
//! #[tokio::main]
//! async fn main() -> effigy::Result<()> {
//!     let client = GenerationClient::builder().build();
//!     let config = ModelConfig::new("https://api.apimart.ai", "sk-...", "sora-2");
//!     let url = client
//!         .generate_video_from_image(
//!             "the figure slowly burns away",
//!             "https://example.com/effigy.jpg",
//!             &config,
//!             Some(&|stage: ProgressStage, _: Option<u8>| eprintln!("{stage}")),
//!         )
//!         .await?;
//!     println!("{url}");
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Images
//!
//! ```no_run
//! use effigy::{GenerationClient, ImageConfig};
//!
//! #[tokio::main]
//! async fn main() -> effigy::Result<()> {
//!     let client = GenerationClient::builder().build();
//!     let config = ImageConfig::new().api_key("ms-...");
//!     let url = client.generate_image("a neon fortune cat", None, Some(&config)).await?;
//!     println!("{url}");
//!     Ok(())
//! }
//! ```
//!
//! # Provider families
//!
//! - **Unified** (`api.apimart.ai`): image-to-video and text-to-video,
//!   progress and time estimates.
//! - **Legacy** (any other base URL): image-to-video only, with separate
//!   request bodies for sora and non-sora models.
//!
//! # Features
//!
//! - `cli` (default): the `effigy` command-line binary.

pub mod client;
pub mod config;
mod error;
pub mod image;
pub mod observer;
pub mod transport;
pub mod video;

// Re-export error types at crate root
pub use error::{EffigyError, ErrorCategory, Result};

pub use client::{
    classify, GenerationClient, GenerationClientBuilder, ImageToVideoOptions, ProgressStage,
    StageCallback, TextToVideoOptions,
};
pub use config::{ImageConfig, ModelConfig, ProviderFamily};
pub use image::{ImageFormat, ImageRequest};
pub use observer::{NoopObserver, Observer, TaskEvent, TracingObserver};
pub use transport::{
    ExecutionContext, HttpRequest, HttpResponse, ProxyPolicy, ProxyRule, ReqwestTransport,
    Transport,
};
pub use video::{
    AspectRatio, ImageToVideoRequest, PollOptions, StatusSource, TaskHandle, TaskPoller,
    TaskState, TaskStatus, TextToVideoRequest, VideoAdapter,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{
        GenerationClient, ImageToVideoOptions, ProgressStage, TextToVideoOptions,
    };
    pub use crate::config::{ImageConfig, ModelConfig, ProviderFamily};
    pub use crate::error::{EffigyError, ErrorCategory, Result};
    pub use crate::video::{TaskHandle, TaskState, TaskStatus};
}
