//! Unified ("Apimart-style") video API.

use crate::config::{join_api_segment, ModelConfig, ProviderFamily};
use crate::error::Result;
use crate::transport::HttpRequest;
use crate::video::adapter::{
    first_string, normalize_sora_duration, normalize_status, progress_at, seconds_at,
    validate_image_source, VideoAdapter, DEFAULT_FAILURE_MESSAGE,
};
use crate::video::providers::to_json;
use crate::video::types::{
    AspectRatio, ImageToVideoRequest, TaskState, TaskStatus, TextToVideoRequest,
};
use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

const GENERATIONS_PATH: &str = "/v1/videos/generations";
const TASKS_PATH: &str = "/v1/tasks";

/// Adapter for the unified video API.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApimartAdapter;

impl VideoAdapter for ApimartAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Unified
    }

    fn image_to_video(
        &self,
        request: &ImageToVideoRequest,
        config: &ModelConfig,
    ) -> Result<HttpRequest> {
        config.validate()?;
        let image = validate_image_source(&request.image_source, true)?;
        let model = config.model_name();

        let body = ApimartVideoRequest {
            model,
            prompt: &request.prompt,
            duration: normalize_sora_duration(model, request.duration_secs),
            aspect_ratio: AspectRatio::Portrait.as_str(),
            private: true,
            image_urls: Some(vec![image]),
        };

        Ok(HttpRequest::post_json(config.endpoint(GENERATIONS_PATH), to_json(&body)?)
            .bearer(&config.api_key))
    }

    fn text_to_video(
        &self,
        request: &TextToVideoRequest,
        config: &ModelConfig,
    ) -> Result<HttpRequest> {
        config.validate()?;
        let model = config.model_name();

        let body = ApimartVideoRequest {
            model,
            prompt: &request.prompt,
            duration: normalize_sora_duration(model, request.duration_secs),
            aspect_ratio: request.aspect_ratio.as_str(),
            private: request.private,
            image_urls: None,
        };

        Ok(HttpRequest::post_json(config.endpoint(GENERATIONS_PATH), to_json(&body)?)
            .bearer(&config.api_key))
    }

    fn query_task(&self, task_id: &str, config: &ModelConfig) -> Result<HttpRequest> {
        config.validate()?;
        // Intermediary caches have served stale task status; bust them.
        let cache_bust = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut url = join_api_segment(&config.base_url, TASKS_PATH, task_id)?;
        url.query_pairs_mut()
            .append_pair("language", "zh")
            .append_pair("_t", &cache_bust.to_string());

        Ok(HttpRequest::get(url)
            .bearer(&config.api_key)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache"))
    }

    fn parse_task_id(&self, body: &Value) -> Option<String> {
        first_string(body, &["/data/0/task_id"])
    }

    fn parse_status(&self, task_id: &str, body: &Value) -> TaskStatus {
        let payload = body
            .get("data")
            .filter(|d| d.is_object())
            .unwrap_or(body);

        let word = first_string(payload, &["/status"]).unwrap_or_else(|| "pending".into());
        let mut status = match normalize_status(&word) {
            TaskState::Completed => TaskStatus::completed(task_id, result_video_url(payload)),
            TaskState::Failed => TaskStatus::failed(
                task_id,
                first_string(payload, &["/error/message", "/error/type", "/message"])
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.into()),
            ),
            state => TaskStatus::new(task_id, state),
        };
        status.progress = progress_at(payload, "/progress");
        status.estimated_time = seconds_at(payload, "/estimated_time");
        status
    }
}

/// Reads `result.videos[0]`, which is either a URL or an object whose
/// `url`/`video_url` holds a URL or a list of URLs.
fn result_video_url(payload: &Value) -> Option<String> {
    let first = payload.pointer("/result/videos/0")?;
    if let Some(url) = first.as_str() {
        return non_empty(url);
    }
    let field = ["url", "video_url"]
        .iter()
        .filter_map(|k| first.get(*k))
        .find(|v| !v.is_null())?;
    match field {
        Value::String(url) => non_empty(url),
        Value::Array(urls) => urls.first().and_then(Value::as_str).and_then(non_empty),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[derive(Debug, Serialize)]
struct ApimartVideoRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    aspect_ratio: &'a str,
    private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_urls: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EffigyError;
    use reqwest::Method;
    use serde_json::json;
    use std::time::Duration;

    fn config(model: &str) -> ModelConfig {
        ModelConfig::new("https://api.apimart.ai", "k", model)
    }

    #[test]
    fn test_image_to_video_body() {
        let req = ImageToVideoRequest::new("test", "https://example.com/a.jpg");
        let http = ApimartAdapter.image_to_video(&req, &config("sora-2")).unwrap();

        assert_eq!(http.method, Method::POST);
        assert_eq!(http.url, "https://api.apimart.ai/v1/videos/generations");
        assert_eq!(http.header_value("Authorization"), Some("Bearer k"));
        assert_eq!(
            http.body,
            Some(json!({
                "model": "sora-2",
                "prompt": "test",
                "duration": 10,
                "aspect_ratio": "9:16",
                "private": true,
                "image_urls": ["https://example.com/a.jpg"]
            }))
        );
    }

    #[test]
    fn test_image_to_video_accepts_data_uri() {
        let req = ImageToVideoRequest::new("test", "data:image/jpeg;base64,/9j/4AAQ");
        let http = ApimartAdapter.image_to_video(&req, &config("veo3")).unwrap();
        let body = http.body.unwrap();
        assert_eq!(body["image_urls"][0], "data:image/jpeg;base64,/9j/4AAQ");
        // Non-sora models keep the requested duration.
        assert_eq!(body["duration"], 5);
    }

    #[test]
    fn test_image_to_video_rejects_local_path() {
        let req = ImageToVideoRequest::new("test", "effigy.png");
        let err = ApimartAdapter
            .image_to_video(&req, &config("sora-2"))
            .unwrap_err();
        assert!(matches!(err, EffigyError::Validation(_)));
    }

    #[test]
    fn test_image_to_video_requires_model() {
        let req = ImageToVideoRequest::new("test", "https://example.com/a.jpg");
        let err = ApimartAdapter.image_to_video(&req, &config(" ")).unwrap_err();
        assert!(matches!(err, EffigyError::Configuration(_)));
    }

    #[test]
    fn test_text_to_video_body() {
        let req = TextToVideoRequest::new("a storm over the sea")
            .with_aspect_ratio(AspectRatio::Landscape)
            .with_private(false)
            .with_duration(20);
        let http = ApimartAdapter
            .text_to_video(&req, &config("sora-2-pro"))
            .unwrap();

        assert_eq!(
            http.body,
            Some(json!({
                "model": "sora-2-pro",
                "prompt": "a storm over the sea",
                "duration": 25,
                "aspect_ratio": "16:9",
                "private": false
            }))
        );
    }

    #[test]
    fn test_query_request_busts_caches() {
        let http = ApimartAdapter
            .query_task("task/1 2", &config("sora-2"))
            .unwrap();

        assert_eq!(http.method, Method::GET);
        assert!(http
            .url
            .starts_with("https://api.apimart.ai/v1/tasks/task%2F1%202?language=zh&_t="));
        assert_eq!(http.header_value("Cache-Control"), Some("no-cache"));
        assert_eq!(http.header_value("Pragma"), Some("no-cache"));
        assert_eq!(http.header_value("Authorization"), Some("Bearer k"));
    }

    #[test]
    fn test_query_request_requires_configuration() {
        let mut missing_key = config("sora-2");
        missing_key.api_key = String::new();
        let err = ApimartAdapter.query_task("task_1", &missing_key).unwrap_err();
        assert!(matches!(err, EffigyError::Configuration(_)));
    }

    #[test]
    fn test_parse_task_id() {
        let body = json!({"code": 200, "data": [{"status": "submitted", "task_id": "task_01"}]});
        assert_eq!(ApimartAdapter.parse_task_id(&body).as_deref(), Some("task_01"));

        assert_eq!(ApimartAdapter.parse_task_id(&json!({"id": "x"})), None);
        assert_eq!(
            ApimartAdapter.parse_task_id(&json!({"data": [{"task_id": ""}]})),
            None
        );
    }

    #[test]
    fn test_parse_completed_status() {
        let body = json!({"status": "succeed", "result": {"videos": [{"url": "https://x/v.mp4"}]}});
        let status = ApimartAdapter.parse_status("t", &body);
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.result_url.as_deref(), Some("https://x/v.mp4"));
    }

    #[test]
    fn test_parse_completed_status_url_shapes() {
        let shapes = [
            json!({"data": {"status": "completed", "result": {"videos": ["https://x/a.mp4"]}}}),
            json!({"data": {"status": "completed", "result": {"videos": [{"url": ["https://x/a.mp4"]}]}}}),
            json!({"data": {"status": "completed", "result": {"videos": [{"video_url": "https://x/a.mp4"}]}}}),
        ];
        for body in shapes {
            let status = ApimartAdapter.parse_status("t", &body);
            assert_eq!(status.result_url.as_deref(), Some("https://x/a.mp4"), "{body}");
        }

        let missing = json!({"data": {"status": "completed", "result": {"videos": []}}});
        let status = ApimartAdapter.parse_status("t", &missing);
        assert_eq!(status.state, TaskState::Completed);
        assert!(status.result_url.is_none());
    }

    #[test]
    fn test_parse_progress_and_estimate() {
        let body = json!({"code": 200, "data": {"status": "processing", "progress": 35, "estimated_time": 300}});
        let status = ApimartAdapter.parse_status("t", &body);
        assert_eq!(status.state, TaskState::Processing);
        assert_eq!(status.progress, Some(35));
        assert_eq!(status.estimated_time, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_parse_failed_status_messages() {
        let body = json!({"data": {"status": "failed", "error": {"message": "content rejected"}}});
        assert_eq!(
            ApimartAdapter.parse_status("t", &body).error.as_deref(),
            Some("content rejected")
        );

        let body = json!({"data": {"status": "failed", "error": {"type": "quota_exceeded"}}});
        assert_eq!(
            ApimartAdapter.parse_status("t", &body).error.as_deref(),
            Some("quota_exceeded")
        );

        let body = json!({"data": {"status": "cancelled"}});
        assert_eq!(
            ApimartAdapter.parse_status("t", &body).error.as_deref(),
            Some(DEFAULT_FAILURE_MESSAGE)
        );
    }

    #[test]
    fn test_missing_status_is_pending() {
        let status = ApimartAdapter.parse_status("t", &json!({"data": {}}));
        assert_eq!(status.state, TaskState::Pending);
    }
}
