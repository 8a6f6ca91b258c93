//! ModelScope inference API image generation (synchronous and async-task modes).

use crate::config::{join_api_segment, join_api_url, ImageConfig};
use crate::error::{EffigyError, Result};
use crate::image::types::{extract_image_url, ImageRequest};
use crate::transport::{HttpRequest, Transport};
use crate::video::{normalize_status, PollOptions, StatusSource, TaskHandle, TaskState, TaskStatus};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const GENERATIONS_PATH: &str = "/images/generations";
const TASKS_PATH: &str = "/tasks";

/// Poll cadence for async-mode image tasks.
pub const ASYNC_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Overall budget for async-mode image tasks.
pub const ASYNC_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll options used for async-mode image tasks.
pub fn async_poll_options() -> PollOptions {
    PollOptions::default()
        .interval(ASYNC_POLL_INTERVAL)
        .timeout(ASYNC_POLL_TIMEOUT)
}

/// Resolved ModelScope credentials and endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelScopeProvider {
    api_key: String,
    model: String,
    base_url: String,
}

impl ModelScopeProvider {
    /// Resolves key, model and base URL from an [`ImageConfig`].
    pub fn from_config(config: &ImageConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.resolve_api_key()?,
            model: config.resolve_model().to_string(),
            base_url: config.resolve_base_url().to_string(),
        })
    }

    /// Returns the model in use.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Builds the generation request. `async_mode` asks for a task id instead of a result.
    pub fn generation_request(&self, request: &ImageRequest, async_mode: bool) -> Result<HttpRequest> {
        request.validate()?;
        let body = ModelScopeRequest {
            model: &self.model,
            prompt: &request.prompt,
            image: request.input_image.as_deref(),
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| EffigyError::Protocol(format!("failed to encode request body: {e}")))?;

        let http = HttpRequest::post_json(join_api_url(&self.base_url, GENERATIONS_PATH), body)
            .bearer(&self.api_key);
        Ok(if async_mode {
            http.header("X-ModelScope-Async-Mode", "true")
        } else {
            http
        })
    }

    /// Builds the async task status query.
    pub fn task_request(&self, task_id: &str) -> Result<HttpRequest> {
        let url = join_api_segment(&self.base_url, TASKS_PATH, task_id)?;
        Ok(HttpRequest::get(url)
            .bearer(&self.api_key)
            .header("X-ModelScope-Task-Type", "image_generation"))
    }

    /// Generates an image in one round trip and returns its URL.
    pub async fn generate(&self, transport: &dyn Transport, request: &ImageRequest) -> Result<String> {
        tracing::debug!(model = %self.model, has_input = request.input_image.is_some(), "generating image");
        let response = transport
            .send(self.generation_request(request, false)?)
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let body: Value = response.json()?;
        extract_image_url(&body)
    }

    /// Submits an async-mode task and returns its handle.
    pub async fn start_task(
        &self,
        transport: &dyn Transport,
        request: &ImageRequest,
    ) -> Result<TaskHandle> {
        let response = transport
            .send(self.generation_request(request, true)?)
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let body: Value = response.json()?;
        match body.get("task_id") {
            Some(Value::String(id)) if !id.trim().is_empty() => Ok(TaskHandle::new(id.trim())),
            Some(Value::Number(id)) => Ok(TaskHandle::new(id.to_string())),
            _ => Err(EffigyError::Protocol(
                "image task response has no task_id".into(),
            )),
        }
    }

    /// Returns a [`StatusSource`] for async-mode tasks.
    pub fn task_source<'a>(&'a self, transport: &'a dyn Transport) -> ImageTaskSource<'a> {
        ImageTaskSource {
            provider: self,
            transport,
        }
    }
}

/// Normalizes an async-mode task body (`task_status`, `output_images`).
pub fn parse_task_status(task_id: &str, body: &Value) -> TaskStatus {
    let word = body
        .get("task_status")
        .and_then(Value::as_str)
        .unwrap_or("PENDING");
    match normalize_status(word) {
        TaskState::Completed => {
            let url = body
                .pointer("/output_images/0")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string);
            TaskStatus::completed(task_id, url)
        }
        TaskState::Failed => TaskStatus::failed(task_id, "image generation task failed"),
        state => TaskStatus::new(task_id, state),
    }
}

/// Polls ModelScope async image tasks.
pub struct ImageTaskSource<'a> {
    provider: &'a ModelScopeProvider,
    transport: &'a dyn Transport,
}

#[async_trait]
impl StatusSource for ImageTaskSource<'_> {
    async fn query(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let response = self
            .transport
            .send(self.provider.task_request(handle.as_str())?)
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let body: Value = response.json()?;
        Ok(parse_task_status(handle.as_str(), &body))
    }
}

#[derive(Debug, Serialize)]
struct ModelScopeRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_IMAGE_BASE_URL, DEFAULT_IMAGE_MODEL};
    use crate::transport::HttpResponse;
    use serde_json::json;
    use std::sync::Mutex;

    fn provider() -> ModelScopeProvider {
        ModelScopeProvider::from_config(&ImageConfig::new().api_key("ms-test")).unwrap()
    }

    /// Returns canned responses and records requests.
    struct Canned {
        responses: Mutex<Vec<Result<HttpResponse>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(mut responses: Vec<Result<HttpResponse>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(EffigyError::transport("no more responses")))
        }
    }

    #[test]
    fn test_defaults() {
        let p = provider();
        assert_eq!(p.model(), DEFAULT_IMAGE_MODEL);
        assert_eq!(p.base_url, DEFAULT_IMAGE_BASE_URL);
    }

    #[test]
    fn test_generation_request() {
        let req = ImageRequest::new("angry boss").with_input_image("https://x/in.png");
        let http = provider().generation_request(&req, false).unwrap();

        assert_eq!(
            http.url,
            "https://api-inference.modelscope.cn/v1/images/generations"
        );
        assert_eq!(http.header_value("Authorization"), Some("Bearer ms-test"));
        assert!(http.header_value("X-ModelScope-Async-Mode").is_none());
        assert_eq!(
            http.body,
            Some(json!({
                "model": DEFAULT_IMAGE_MODEL,
                "prompt": "angry boss",
                "image": "https://x/in.png"
            }))
        );

        let http = provider()
            .generation_request(&ImageRequest::new("x"), true)
            .unwrap();
        assert_eq!(http.header_value("X-ModelScope-Async-Mode"), Some("true"));
        assert_eq!(http.body.unwrap().get("image"), None);
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let err = provider()
            .generation_request(&ImageRequest::new(""), false)
            .unwrap_err();
        assert!(matches!(err, EffigyError::Validation(_)));
    }

    #[test]
    fn test_task_request() {
        let http = provider().task_request("abc").unwrap();
        assert_eq!(http.url, "https://api-inference.modelscope.cn/v1/tasks/abc");

        let http = provider().task_request("img 1").unwrap();
        assert_eq!(http.url, "https://api-inference.modelscope.cn/v1/tasks/img%201");
        assert_eq!(
            http.header_value("X-ModelScope-Task-Type"),
            Some("image_generation")
        );
    }

    #[test]
    fn test_parse_task_status() {
        let done = parse_task_status(
            "t",
            &json!({"task_status": "SUCCEED", "output_images": ["https://x/o.png"]}),
        );
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(done.result_url.as_deref(), Some("https://x/o.png"));

        let empty = parse_task_status("t", &json!({"task_status": "SUCCEED", "output_images": []}));
        assert_eq!(empty.state, TaskState::Completed);
        assert!(empty.result_url.is_none());

        let failed = parse_task_status("t", &json!({"task_status": "FAILED"}));
        assert_eq!(failed.state, TaskState::Failed);

        let running = parse_task_status("t", &json!({"task_status": "RUNNING"}));
        assert_eq!(running.state, TaskState::Processing);

        let pending = parse_task_status("t", &json!({}));
        assert_eq!(pending.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn test_generate_parses_response() {
        let transport = Canned::new(vec![Ok(HttpResponse::json_body(
            200,
            &json!({"images": [{"url": "https://x/img.png"}]}),
        ))]);
        let url = provider()
            .generate(&transport, &ImageRequest::new("boss"))
            .await
            .unwrap();
        assert_eq!(url, "https://x/img.png");
    }

    #[tokio::test]
    async fn test_generate_http_error() {
        let transport = Canned::new(vec![Ok(HttpResponse::json_body(
            401,
            &json!({"message": "invalid token"}),
        ))]);
        let err = provider()
            .generate(&transport, &ImageRequest::new("boss"))
            .await
            .unwrap_err();
        assert!(matches!(err, EffigyError::Http { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_start_task() {
        let transport = Canned::new(vec![
            Ok(HttpResponse::json_body(200, &json!({"task_id": "img-1"}))),
            Ok(HttpResponse::json_body(200, &json!({"request_id": "r"}))),
        ]);
        let p = provider();
        let handle = p.start_task(&transport, &ImageRequest::new("boss")).await.unwrap();
        assert_eq!(handle.as_str(), "img-1");

        let err = p
            .start_task(&transport, &ImageRequest::new("boss"))
            .await
            .unwrap_err();
        assert!(matches!(err, EffigyError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_task_polls_to_completion() {
        let transport = Canned::new(vec![
            Ok(HttpResponse::json_body(200, &json!({"task_status": "PENDING"}))),
            Ok(HttpResponse::json_body(200, &json!({"task_status": "RUNNING"}))),
            Ok(HttpResponse::json_body(
                200,
                &json!({"task_status": "SUCCEED", "output_images": ["https://x/o.png"]}),
            )),
        ]);
        let p = provider();
        let poller = crate::video::TaskPoller::new(async_poll_options());
        let url = poller
            .wait(&p.task_source(&transport), &TaskHandle::new("img-1"), None)
            .await
            .unwrap();
        assert_eq!(url, "https://x/o.png");
        assert_eq!(transport.requests.lock().unwrap().len(), 3);
    }
}
