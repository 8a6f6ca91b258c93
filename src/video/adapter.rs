//! Provider adapter trait and the normalization rules shared by both dialects.

use crate::config::{ModelConfig, ProviderFamily};
use crate::error::{EffigyError, Result};
use crate::transport::HttpRequest;
use crate::video::types::{ImageToVideoRequest, TaskState, TaskStatus, TextToVideoRequest};
use serde_json::Value;
use std::time::Duration;

/// Message used when a failed task carries no explanation.
pub(crate) const DEFAULT_FAILURE_MESSAGE: &str = "video generation failed";

/// Translates generic requests into one provider dialect and back.
///
/// Adapters are pure: they build requests and parse bodies, the
/// [`Transport`](crate::transport::Transport) does the I/O.
pub trait VideoAdapter: Send + Sync {
    /// The dialect this adapter speaks.
    fn family(&self) -> ProviderFamily;

    /// Builds the task-creation request for image-to-video.
    fn image_to_video(
        &self,
        request: &ImageToVideoRequest,
        config: &ModelConfig,
    ) -> Result<HttpRequest>;

    /// Builds the task-creation request for text-to-video.
    fn text_to_video(
        &self,
        _request: &TextToVideoRequest,
        _config: &ModelConfig,
    ) -> Result<HttpRequest> {
        Err(EffigyError::UnsupportedProvider(format!(
            "text-to-video is not available with the {} provider family, switch to https://{}",
            self.family(),
            crate::config::APIMART_HOST
        )))
    }

    /// Builds the status query for a task.
    fn query_task(&self, task_id: &str, config: &ModelConfig) -> Result<HttpRequest>;

    /// Extracts the task id from a creation response.
    fn parse_task_id(&self, body: &Value) -> Option<String>;

    /// Normalizes a status response.
    fn parse_status(&self, task_id: &str, body: &Value) -> TaskStatus;
}

/// Returns the adapter for a provider family.
pub fn adapter_for(family: ProviderFamily) -> &'static dyn VideoAdapter {
    match family {
        ProviderFamily::Unified => &super::providers::ApimartAdapter,
        ProviderFamily::Legacy => &super::providers::LegacyAdapter,
    }
}

/// Maps a requested duration onto the tiers sora models accept.
///
/// `sora*pro*` models take 15 or 25 seconds, other sora models 10 or 15.
/// A missing duration selects the upper tier. Non-sora models pass through.
pub fn normalize_sora_duration(model: &str, requested: Option<u32>) -> Option<u32> {
    let model = model.trim();
    if !model.starts_with("sora") {
        return requested;
    }
    let (lower, upper) = if model.contains("pro") {
        (15, 25)
    } else {
        (10, 15)
    };
    match requested {
        Some(secs) if secs <= lower => Some(lower),
        _ => Some(upper),
    }
}

/// Maps a provider status word onto the canonical four states.
///
/// Unknown words are treated as still in flight.
pub fn normalize_status(status: &str) -> TaskState {
    match status.trim().to_ascii_lowercase().as_str() {
        "completed" | "succeed" | "success" => TaskState::Completed,
        "failed" | "error" | "cancelled" | "canceled" => TaskState::Failed,
        "queued" | "queueing" => TaskState::Pending,
        "processing" | "running" => TaskState::Processing,
        _ => TaskState::Pending,
    }
}

/// Checks that an image source is usable by the provider.
///
/// Every family takes http(s) URLs; `allow_data_uri` additionally admits
/// `data:image/...` payloads. Returns the trimmed source.
pub fn validate_image_source(source: &str, allow_data_uri: bool) -> Result<String> {
    let trimmed = source.trim();
    let lower = trimmed.to_ascii_lowercase();
    let is_http = lower.starts_with("http://") || lower.starts_with("https://");
    let is_data_uri = lower.starts_with("data:image/");

    if is_http || (allow_data_uri && is_data_uri) {
        return Ok(trimmed.to_string());
    }

    let expected = if allow_data_uri {
        "a public image URL (http/https) or a base64 data URI"
    } else {
        "a public image URL (http/https)"
    };
    Err(EffigyError::Validation(format!(
        "image-to-video requires {expected}"
    )))
}

/// Returns the first non-empty string found at any of `pointers`.
pub(crate) fn first_string(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| {
        body.pointer(p)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Reads a numeric percentage, clamped to 0-100.
pub(crate) fn progress_at(body: &Value, pointer: &str) -> Option<u8> {
    body.pointer(pointer)
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 100.0).round() as u8)
}

/// Reads a non-negative number of seconds.
pub(crate) fn seconds_at(body: &Value, pointer: &str) -> Option<Duration> {
    body.pointer(pointer)
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}
