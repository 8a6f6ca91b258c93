//! Legacy video dialect (`/v1/video/create` + `/v1/video/query`).
//!
//! Sora models and everything else share the endpoints but not the body.

use crate::config::{ModelConfig, ProviderFamily};
use crate::error::{EffigyError, Result};
use crate::transport::HttpRequest;
use crate::video::adapter::{
    first_string, normalize_sora_duration, normalize_status, validate_image_source,
    VideoAdapter, DEFAULT_FAILURE_MESSAGE,
};
use crate::video::providers::to_json;
use crate::video::types::{ImageToVideoRequest, TaskState, TaskStatus};
use serde::Serialize;
use serde_json::Value;

const CREATE_PATH: &str = "/v1/video/create";
const QUERY_PATH: &str = "/v1/video/query";

/// Where a task id may appear in a creation response, in order.
const TASK_ID_FIELDS: &[&str] = &["/id", "/task_id", "/data/id", "/data/task_id"];

/// Where the status word may appear, in order.
const STATUS_FIELDS: &[&str] = &[
    "/status",
    "/detail/status",
    "/detail/pending_info/status",
    "/task_status",
    "/state",
];

/// Where a finished video URL may appear, in order.
const VIDEO_URL_FIELDS: &[&str] = &[
    "/video_url",
    "/detail/url",
    "/detail/video_url",
    "/output/video_url",
    "/data/video_url",
    "/result/video_url",
    "/videos/0/url",
];

/// Where a failure message may appear, in order.
const ERROR_FIELDS: &[&str] = &["/error", "/error/message", "/message", "/detail/failure_reason"];

/// Adapter for the legacy video dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyAdapter;

impl VideoAdapter for LegacyAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Legacy
    }

    fn image_to_video(
        &self,
        request: &ImageToVideoRequest,
        config: &ModelConfig,
    ) -> Result<HttpRequest> {
        config.validate()?;
        let image = validate_image_source(&request.image_source, false)?;
        let model = config.model_name();

        let body = if model.starts_with("sora") {
            to_json(&SoraCreateRequest {
                images: vec![image],
                model,
                orientation: "portrait",
                prompt: &request.prompt,
                size: "small",
                duration: normalize_sora_duration(model, request.duration_secs),
                watermark: false,
                private: true,
            })?
        } else {
            to_json(&GenericCreateRequest {
                enable_upsample: true,
                enhance_prompt: true,
                images: vec![image],
                model,
                prompt: &request.prompt,
                aspect_ratio: "9:16",
            })?
        };

        Ok(HttpRequest::post_json(config.endpoint(CREATE_PATH), body).bearer(&config.api_key))
    }

    fn query_task(&self, task_id: &str, config: &ModelConfig) -> Result<HttpRequest> {
        config.validate()?;
        let endpoint = config.endpoint(QUERY_PATH);
        let mut url = url::Url::parse(&endpoint).map_err(|e| {
            EffigyError::Configuration(format!("invalid API base URL {endpoint}: {e}"))
        })?;
        url.query_pairs_mut().append_pair("id", task_id);
        Ok(HttpRequest::get(url).bearer(&config.api_key))
    }

    fn parse_task_id(&self, body: &Value) -> Option<String> {
        TASK_ID_FIELDS.iter().find_map(|p| match body.pointer(p)? {
            Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
    }

    fn parse_status(&self, task_id: &str, body: &Value) -> TaskStatus {
        let word = first_string(body, STATUS_FIELDS).unwrap_or_else(|| "pending".into());
        match normalize_status(&word) {
            TaskState::Completed => {
                TaskStatus::completed(task_id, first_string(body, VIDEO_URL_FIELDS))
            }
            TaskState::Failed => TaskStatus::failed(
                task_id,
                first_string(body, ERROR_FIELDS)
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.into()),
            ),
            state => TaskStatus::new(task_id, state),
        }
    }
}

#[derive(Debug, Serialize)]
struct SoraCreateRequest<'a> {
    images: Vec<String>,
    model: &'a str,
    orientation: &'a str,
    prompt: &'a str,
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    watermark: bool,
    private: bool,
}

#[derive(Debug, Serialize)]
struct GenericCreateRequest<'a> {
    enable_upsample: bool,
    enhance_prompt: bool,
    images: Vec<String>,
    model: &'a str,
    prompt: &'a str,
    aspect_ratio: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::types::TextToVideoRequest;
    use serde_json::json;

    fn config(model: &str) -> ModelConfig {
        ModelConfig::new("https://gw.example.com/v1/", "k", model)
    }

    #[test]
    fn test_sora_body() {
        let req = ImageToVideoRequest::new("curse", "https://example.com/a.jpg").with_duration(12);
        let http = LegacyAdapter.image_to_video(&req, &config("sora-2-pro")).unwrap();

        assert_eq!(http.url, "https://gw.example.com/v1/video/create");
        assert_eq!(
            http.body,
            Some(json!({
                "images": ["https://example.com/a.jpg"],
                "model": "sora-2-pro",
                "orientation": "portrait",
                "prompt": "curse",
                "size": "small",
                "duration": 15,
                "watermark": false,
                "private": true
            }))
        );
    }

    #[test]
    fn test_non_sora_body() {
        let req = ImageToVideoRequest::new("curse", "https://example.com/a.jpg");
        let http = LegacyAdapter.image_to_video(&req, &config("veo3-fast")).unwrap();

        assert_eq!(
            http.body,
            Some(json!({
                "enable_upsample": true,
                "enhance_prompt": true,
                "images": ["https://example.com/a.jpg"],
                "model": "veo3-fast",
                "prompt": "curse",
                "aspect_ratio": "9:16"
            }))
        );
    }

    #[test]
    fn test_rejects_data_uri_and_local_paths() {
        for source in ["data:image/png;base64,AAAA", "images/effigy.png"] {
            let req = ImageToVideoRequest::new("curse", source);
            let err = LegacyAdapter.image_to_video(&req, &config("sora-2")).unwrap_err();
            assert!(matches!(err, EffigyError::Validation(_)), "{source}");
        }
    }

    #[test]
    fn test_requires_base_url() {
        let req = ImageToVideoRequest::new("curse", "https://example.com/a.jpg");
        let config = ModelConfig::new("", "k", "sora-2");
        assert!(matches!(
            LegacyAdapter.image_to_video(&req, &config),
            Err(EffigyError::Configuration(_))
        ));
    }

    #[test]
    fn test_text_to_video_unsupported() {
        let err = LegacyAdapter
            .text_to_video(&TextToVideoRequest::new("storm"), &config("sora-2"))
            .unwrap_err();
        assert!(matches!(err, EffigyError::UnsupportedProvider(_)));
    }

    #[test]
    fn test_query_request() {
        let http = LegacyAdapter.query_task("abc 1", &config("sora-2")).unwrap();
        assert_eq!(http.url, "https://gw.example.com/v1/video/query?id=abc+1");
        assert!(http.header_value("Cache-Control").is_none());
    }

    #[test]
    fn test_query_request_requires_configuration() {
        let mut missing_key = config("sora-2");
        missing_key.api_key = " ".into();
        let err = LegacyAdapter.query_task("abc", &missing_key).unwrap_err();
        assert!(matches!(err, EffigyError::Configuration(_)));
    }

    #[test]
    fn test_parse_task_id_fallbacks() {
        assert_eq!(
            LegacyAdapter.parse_task_id(&json!({"id": "a"})).as_deref(),
            Some("a")
        );
        assert_eq!(
            LegacyAdapter.parse_task_id(&json!({"task_id": "b"})).as_deref(),
            Some("b")
        );
        assert_eq!(
            LegacyAdapter
                .parse_task_id(&json!({"data": {"task_id": "c"}}))
                .as_deref(),
            Some("c")
        );
        assert_eq!(
            LegacyAdapter.parse_task_id(&json!({"data": {"id": 42}})).as_deref(),
            Some("42")
        );
        assert_eq!(LegacyAdapter.parse_task_id(&json!({"ok": true})), None);
    }

    #[test]
    fn test_parse_status_fields() {
        let body = json!({"detail": {"pending_info": {"status": "queued"}}});
        assert_eq!(LegacyAdapter.parse_status("t", &body).state, TaskState::Pending);

        let body = json!({"task_status": "RUNNING"});
        assert_eq!(
            LegacyAdapter.parse_status("t", &body).state,
            TaskState::Processing
        );

        let body = json!({"state": "success", "detail": {"video_url": "https://x/d.mp4"}});
        let status = LegacyAdapter.parse_status("t", &body);
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.result_url.as_deref(), Some("https://x/d.mp4"));
    }

    #[test]
    fn test_parse_video_url_precedence() {
        let body = json!({
            "status": "completed",
            "videos": [{"url": "https://x/last.mp4"}],
            "output": {"video_url": "https://x/output.mp4"},
            "video_url": "https://x/first.mp4"
        });
        assert_eq!(
            LegacyAdapter.parse_status("t", &body).result_url.as_deref(),
            Some("https://x/first.mp4")
        );

        let body = json!({"status": "completed", "videos": [{"url": "https://x/last.mp4"}]});
        assert_eq!(
            LegacyAdapter.parse_status("t", &body).result_url.as_deref(),
            Some("https://x/last.mp4")
        );
    }

    #[test]
    fn test_parse_failure_message() {
        let body = json!({"status": "failed", "detail": {"failure_reason": "nsfw input"}});
        assert_eq!(
            LegacyAdapter.parse_status("t", &body).error.as_deref(),
            Some("nsfw input")
        );

        let body = json!({"status": "error", "error": {"message": "quota"}});
        assert_eq!(
            LegacyAdapter.parse_status("t", &body).error.as_deref(),
            Some("quota")
        );

        let body = json!({"status": "canceled"});
        assert_eq!(
            LegacyAdapter.parse_status("t", &body).error.as_deref(),
            Some(DEFAULT_FAILURE_MESSAGE)
        );
    }
}
