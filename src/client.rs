//! One-call generation entry points.
//!
//! [`GenerationClient`] composes the video adapters, the transport and the
//! poll loop, validates caller input, and rewrites low-level failures into
//! the categories a UI branches on (see [`EffigyError::category`]).

use crate::config::{ImageConfig, ModelConfig};
use crate::error::{sanitize_error_message, EffigyError, Result};
use crate::image::prompts;
use crate::image::providers::{async_poll_options, ModelScopeProvider};
use crate::image::ImageRequest;
use crate::observer::{NoopObserver, Observer, TaskEvent};
use crate::transport::{ExecutionContext, HttpRequest, ProxyPolicy, ReqwestTransport, Transport};
use crate::video::{
    adapter_for, AspectRatio, ImageToVideoRequest, PollOptions, ProgressCallback, StatusSource,
    TaskHandle, TaskPoller, TaskState, TaskStatus, TextToVideoRequest, VideoAdapter,
    VideoTaskSource,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Coarse progress reported by the one-call operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    /// Task submitted or waiting in the provider's queue.
    Queued,
    /// The provider is generating.
    Generating,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl From<TaskState> for ProgressStage {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Pending => Self::Queued,
            TaskState::Processing => Self::Generating,
            TaskState::Completed => Self::Done,
            TaskState::Failed => Self::Failed,
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Generating => write!(f, "generating"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Callback receiving the coarse stage and, when reported, a percentage.
pub type StageCallback<'a> = &'a (dyn Fn(ProgressStage, Option<u8>) + Send + Sync);

/// Options for [`GenerationClient::generate_video_from_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextToVideoOptions {
    /// Requested duration in seconds.
    pub duration: Option<u32>,
    /// Output aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// Whether the result is private on the provider side.
    pub private: bool,
    /// Overrides the client's poll deadline.
    pub max_wait: Option<Duration>,
}

impl Default for TextToVideoOptions {
    fn default() -> Self {
        Self {
            duration: None,
            aspect_ratio: AspectRatio::default(),
            private: true,
            max_wait: None,
        }
    }
}

impl TextToVideoOptions {
    /// Sets the requested duration.
    pub fn duration(mut self, secs: u32) -> Self {
        self.duration = Some(secs);
        self
    }

    /// Sets the aspect ratio.
    pub fn aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Sets the privacy flag.
    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Sets the poll deadline.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

/// Options for [`GenerationClient::generate_video_from_image_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageToVideoOptions {
    /// Requested duration in seconds; 5 when unset. Sora models snap it to a supported tier.
    pub duration: Option<u32>,
    /// Overrides the client's poll deadline.
    pub max_wait: Option<Duration>,
}

impl ImageToVideoOptions {
    /// Sets the requested duration.
    pub fn duration(mut self, secs: u32) -> Self {
        self.duration = Some(secs);
        self
    }

    /// Sets the poll deadline.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

/// Builder for [`GenerationClient`].
pub struct GenerationClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    context: ExecutionContext,
    policy: ProxyPolicy,
    observer: Arc<dyn Observer>,
    poll: PollOptions,
    request_timeout: Option<Duration>,
    placeholder_fallback: bool,
}

impl Default for GenerationClientBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            context: ExecutionContext::default(),
            policy: ProxyPolicy::default(),
            observer: Arc::new(NoopObserver),
            poll: PollOptions::default(),
            request_timeout: None,
            placeholder_fallback: false,
        }
    }
}

impl std::fmt::Debug for GenerationClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClientBuilder")
            .field("context", &self.context)
            .field("policy", &self.policy)
            .field("poll", &self.poll)
            .field("request_timeout", &self.request_timeout)
            .field("placeholder_fallback", &self.placeholder_fallback)
            .finish_non_exhaustive()
    }
}

impl GenerationClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom transport. Context and proxy policy are then ignored.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the execution context of the default transport.
    pub fn execution_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the relay policy of the default transport.
    pub fn proxy_policy(mut self, policy: ProxyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the diagnostics observer.
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets all poll options at once.
    pub fn poll_options(mut self, options: PollOptions) -> Self {
        self.poll = options;
        self
    }

    /// Sets the delay between status queries (default: 3s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll = self.poll.interval(interval);
        self
    }

    /// Sets the default video deadline (default: 15 minutes).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.poll = self.poll.timeout(timeout);
        self
    }

    /// Sets the grace added to server estimates (default: 120s).
    pub fn eta_grace(mut self, grace: Duration) -> Self {
        self.poll = self.poll.eta_grace(grace);
        self
    }

    /// Sets the consecutive transient failure cap (default: 25).
    pub fn max_transient_errors(mut self, max: u32) -> Self {
        self.poll = self.poll.max_transient_errors(max);
        self
    }

    /// Sets the per-request timeout of the default transport (default: 120s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Returns placeholder images for catalogue prompts when image
    /// generation cannot reach the network (default: off).
    pub fn placeholder_fallback(mut self, enabled: bool) -> Self {
        self.placeholder_fallback = enabled;
        self
    }

    /// Builds the client.
    pub fn build(self) -> GenerationClient {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let mut transport = ReqwestTransport::new()
                    .with_context(self.context)
                    .with_policy(self.policy)
                    .with_observer(self.observer.clone());
                if let Some(timeout) = self.request_timeout {
                    transport = transport.with_request_timeout(timeout);
                }
                Arc::new(transport)
            }
        };

        GenerationClient {
            transport,
            context: self.context,
            poller: TaskPoller::new(self.poll).with_observer(self.observer.clone()),
            observer: self.observer,
            placeholder_fallback: self.placeholder_fallback,
        }
    }
}

/// Creates generation tasks and waits for their results.
///
/// Cheap to clone; every call owns its own poll state, so one client can
/// serve concurrent generations.
#[derive(Clone)]
pub struct GenerationClient {
    transport: Arc<dyn Transport>,
    context: ExecutionContext,
    poller: TaskPoller,
    observer: Arc<dyn Observer>,
    placeholder_fallback: bool,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("context", &self.context)
            .field("poller", &self.poller)
            .field("placeholder_fallback", &self.placeholder_fallback)
            .finish_non_exhaustive()
    }
}

impl Default for GenerationClient {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GenerationClient {
    /// Creates a new `GenerationClientBuilder`.
    pub fn builder() -> GenerationClientBuilder {
        GenerationClientBuilder::new()
    }

    /// Returns the default poll options.
    pub fn poll_options(&self) -> &PollOptions {
        self.poller.options()
    }

    /// Animates an image and waits for the video URL.
    ///
    /// Both `prompt` and `image_url` must be non-empty. Failures other than
    /// validation are classified into [`EffigyError::Auth`],
    /// [`EffigyError::RateLimited`] or [`EffigyError::UpstreamUnavailable`]
    /// where they match; anything else is returned unchanged.
    pub async fn generate_video_from_image(
        &self,
        prompt: &str,
        image_url: &str,
        config: &ModelConfig,
        on_progress: Option<StageCallback<'_>>,
    ) -> Result<String> {
        self.generate_video_from_image_with_options(
            prompt,
            image_url,
            config,
            on_progress,
            ImageToVideoOptions::default(),
        )
        .await
    }

    /// Like [`Self::generate_video_from_image`], with a requested duration
    /// and deadline.
    pub async fn generate_video_from_image_with_options(
        &self,
        prompt: &str,
        image_url: &str,
        config: &ModelConfig,
        on_progress: Option<StageCallback<'_>>,
        options: ImageToVideoOptions,
    ) -> Result<String> {
        if image_url.trim().is_empty() {
            return Err(EffigyError::Validation(
                "an image is required for image-to-video".into(),
            ));
        }
        require_prompt(prompt)?;

        let mut request = ImageToVideoRequest::new(prompt, image_url);
        if let Some(secs) = options.duration {
            request = request.with_duration(secs);
        }
        self.run_video(on_progress, options.max_wait, config, async {
            self.create_image_to_video_task(&request, config).await
        })
        .await
    }

    /// Generates a video from text and waits for its URL.
    ///
    /// Only the unified provider family supports this; others fail with
    /// [`EffigyError::UnsupportedProvider`].
    pub async fn generate_video_from_text(
        &self,
        prompt: &str,
        config: &ModelConfig,
        on_progress: Option<StageCallback<'_>>,
        options: TextToVideoOptions,
    ) -> Result<String> {
        require_prompt(prompt)?;

        let mut request = TextToVideoRequest::new(prompt)
            .with_aspect_ratio(options.aspect_ratio)
            .with_private(options.private);
        request.duration_secs = options.duration;

        self.run_video(on_progress, options.max_wait, config, async {
            self.create_text_to_video_task(&request, config).await
        })
        .await
    }

    /// Submits an image-to-video task without waiting for it.
    pub async fn create_image_to_video_task(
        &self,
        request: &ImageToVideoRequest,
        config: &ModelConfig,
    ) -> Result<TaskHandle> {
        require_prompt(&request.prompt)?;
        let adapter = adapter_for(config.family());
        let http = adapter.image_to_video(request, config)?;
        self.submit(adapter, http).await
    }

    /// Submits a text-to-video task without waiting for it.
    pub async fn create_text_to_video_task(
        &self,
        request: &TextToVideoRequest,
        config: &ModelConfig,
    ) -> Result<TaskHandle> {
        require_prompt(&request.prompt)?;
        let adapter = adapter_for(config.family());
        let http = adapter.text_to_video(request, config)?;
        self.submit(adapter, http).await
    }

    /// Queries a video task once.
    pub async fn query_video_task(
        &self,
        handle: &TaskHandle,
        config: &ModelConfig,
    ) -> Result<TaskStatus> {
        self.video_source(config).query(handle).await
    }

    /// Polls a video task until it finishes and returns the video URL.
    ///
    /// `max_wait` overrides the client's default deadline.
    pub async fn wait_for_video_completion(
        &self,
        handle: &TaskHandle,
        config: &ModelConfig,
        on_progress: Option<ProgressCallback<'_>>,
        max_wait: Option<Duration>,
    ) -> Result<String> {
        let source = self.video_source(config);
        match max_wait {
            Some(timeout) => {
                let poller = TaskPoller::new(self.poller.options().timeout(timeout))
                    .with_observer(self.observer.clone());
                poller.wait(&source, handle, on_progress).await
            }
            None => self.poller.wait(&source, handle, on_progress).await,
        }
    }

    /// Generates an image in one request and returns its URL.
    ///
    /// With the placeholder fallback enabled, a network failure for a
    /// catalogue prompt returns that prompt's placeholder image instead.
    pub async fn generate_image(
        &self,
        prompt: &str,
        input_image: Option<&str>,
        config: Option<&ImageConfig>,
    ) -> Result<String> {
        let request = image_request(prompt, input_image)?;
        let default_config = ImageConfig::default();
        let provider = ModelScopeProvider::from_config(config.unwrap_or(&default_config))?;

        match provider.generate(self.transport.as_ref(), &request).await {
            Err(e @ EffigyError::Transport { .. }) if self.placeholder_fallback => {
                match self.placeholder(prompt) {
                    Some(url) => {
                        tracing::warn!("image generation unreachable ({e}), using placeholder");
                        Ok(url)
                    }
                    None => Err(e),
                }
            }
            other => other,
        }
    }

    /// Generates an image through an async-mode task (1s polls, 60s budget).
    ///
    /// In browser execution this falls back to [`Self::generate_image`].
    pub async fn generate_image_async(
        &self,
        prompt: &str,
        input_image: Option<&str>,
        config: Option<&ImageConfig>,
    ) -> Result<String> {
        if self.context == ExecutionContext::Browser {
            return self.generate_image(prompt, input_image, config).await;
        }

        let request = image_request(prompt, input_image)?;
        let default_config = ImageConfig::default();
        let provider = ModelScopeProvider::from_config(config.unwrap_or(&default_config))?;

        let transport = self.transport.as_ref();
        let handle = provider.start_task(transport, &request).await?;
        tracing::debug!(task_id = %handle, model = provider.model(), "image task started");

        let poller = TaskPoller::new(async_poll_options()).with_observer(self.observer.clone());
        let source = provider.task_source(transport);
        let url = poller.wait(&source, &handle, None).await?;
        Ok(url)
    }

    async fn submit(&self, adapter: &dyn VideoAdapter, http: HttpRequest) -> Result<TaskHandle> {
        let response = self.transport.send(http).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let body: Value = response.json()?;
        let task_id = adapter.parse_task_id(&body).ok_or_else(|| {
            EffigyError::Protocol(format!(
                "no task id in creation response: {}",
                sanitize_error_message(&response.body)
            ))
        })?;

        tracing::info!(task_id = %task_id, family = %adapter.family(), "video task created");
        self.observer.on_event(&TaskEvent::TaskCreated {
            task_id: task_id.clone(),
            family: adapter.family(),
        });
        Ok(TaskHandle::new(task_id))
    }

    fn video_source<'a>(&'a self, config: &'a ModelConfig) -> VideoTaskSource<'a> {
        VideoTaskSource {
            transport: self.transport.as_ref(),
            adapter: adapter_for(config.family()),
            config,
        }
    }

    /// Shared create-then-wait flow with stage reporting and classification.
    async fn run_video<F>(
        &self,
        on_progress: Option<StageCallback<'_>>,
        max_wait: Option<Duration>,
        config: &ModelConfig,
        create: F,
    ) -> Result<String>
    where
        F: std::future::Future<Output = Result<TaskHandle>>,
    {
        let report = |stage: ProgressStage, percent: Option<u8>| {
            if let Some(callback) = on_progress {
                callback(stage, percent);
            }
        };

        report(ProgressStage::Queued, None);
        let result = async {
            let handle = create.await?;
            report(ProgressStage::Generating, None);
            let forward =
                |status: &TaskStatus| report(ProgressStage::from(status.state), status.progress);
            self.wait_for_video_completion(&handle, config, Some(&forward), max_wait)
                .await
        }
        .await;

        result.map_err(|e| {
            report(ProgressStage::Failed, None);
            classify(e)
        })
    }

    fn placeholder(&self, prompt: &str) -> Option<String> {
        let key = prompts::prompt_key(prompt)?;
        let url = prompts::placeholder_for(key)?.to_string();
        self.observer.on_event(&TaskEvent::PlaceholderUsed {
            key: key.to_string(),
            url: url.clone(),
        });
        Some(url)
    }
}

fn require_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(EffigyError::Validation("prompt must not be empty".into()));
    }
    Ok(())
}

fn image_request(prompt: &str, input_image: Option<&str>) -> Result<ImageRequest> {
    let mut request = ImageRequest::new(prompt);
    if let Some(image) = input_image {
        request = request.with_input_image(image);
    }
    request.validate()?;
    Ok(request)
}

/// Rewrites a low-level failure into the category the caller acts on.
///
/// The original error is kept as the source.
pub fn classify(err: EffigyError) -> EffigyError {
    match err {
        EffigyError::Http { status, .. } if matches!(status, 401 | 403) => EffigyError::Auth {
            message: "check the API key in the provider configuration".into(),
            source: Some(Box::new(err)),
        },
        EffigyError::Http {
            status: 429,
            retry_after,
            ..
        } => EffigyError::RateLimited {
            retry_after,
            source: Some(Box::new(err)),
        },
        EffigyError::Http {
            status,
            ref message,
            ..
        } if status >= 500 || message.contains("HTML error page") || message.contains("DNS") => {
            let message = if message.contains("DNS") {
                "provider DNS resolution failed, retry later or switch provider".to_string()
            } else {
                format!("provider returned HTTP {status}, retry later")
            };
            EffigyError::UpstreamUnavailable {
                message,
                source: Some(Box::new(err)),
            }
        }
        other => other,
    }
}
