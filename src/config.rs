//! Provider configuration consumed by the generation client.

use crate::error::{EffigyError, Result};
use serde::{Deserialize, Serialize};

/// Host that identifies the unified ("Apimart-style") video API.
pub const APIMART_HOST: &str = "api.apimart.ai";

/// Default image generation endpoint (ModelScope inference API).
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://api-inference.modelscope.cn/v1";

/// Default image generation model.
pub const DEFAULT_IMAGE_MODEL: &str = "Tongyi-MAI/Z-Image-Turbo";

/// Host aliases rewritten before any request is built.
const HOST_ALIASES: &[(&str, &str)] = &[("api.qingyuntop.cn", "api.qingyuntop.top")];

/// Wire-protocol dialect spoken by a video provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// Unified video API (`/v1/videos/generations`, `/v1/tasks/{id}`).
    Unified,
    /// Legacy sora/non-sora dialect (`/v1/video/create`, `/v1/video/query`).
    Legacy,
}

impl ProviderFamily {
    /// Detects the family from a base URL.
    pub fn detect(base_url: &str) -> Self {
        if normalize_base_url(base_url).contains(APIMART_HOST) {
            Self::Unified
        } else {
            Self::Legacy
        }
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unified => write!(f, "unified"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

impl std::str::FromStr for ProviderFamily {
    type Err = EffigyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unified" | "apimart" => Ok(Self::Unified),
            "legacy" => Ok(Self::Legacy),
            other => Err(EffigyError::Configuration(format!(
                "unknown provider family: {other}"
            ))),
        }
    }
}

/// One video provider endpoint and credential set.
///
/// Owned by the caller's configuration storage; the client only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider base URL, e.g. `https://api.apimart.ai`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_key: String,
    /// Model name, e.g. `sora-2`.
    pub model: String,
    /// Explicit family; detected from `base_url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<ProviderFamily>,
}

impl ModelConfig {
    /// Environment variable holding the video base URL.
    pub const BASE_URL_ENV: &'static str = "EFFIGY_VIDEO_BASE_URL";
    /// Environment variable holding the video API key.
    pub const API_KEY_ENV: &'static str = "EFFIGY_VIDEO_API_KEY";
    /// Environment variable holding the video model name.
    pub const MODEL_ENV: &'static str = "EFFIGY_VIDEO_MODEL";

    /// Creates a config with family detection.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            family: None,
        }
    }

    /// Loads the config from `EFFIGY_VIDEO_*` environment variables.
    ///
    /// Missing variables become empty strings; [`ModelConfig::validate`]
    /// reports them.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self::new(
            var(Self::BASE_URL_ENV),
            var(Self::API_KEY_ENV),
            var(Self::MODEL_ENV),
        )
    }

    /// Forces a provider family instead of detecting it.
    pub fn with_family(mut self, family: ProviderFamily) -> Self {
        self.family = Some(family);
        self
    }

    /// Returns the effective provider family.
    pub fn family(&self) -> ProviderFamily {
        self.family
            .unwrap_or_else(|| ProviderFamily::detect(&self.base_url))
    }

    /// Returns the trimmed model name.
    pub fn model_name(&self) -> &str {
        self.model.trim()
    }

    /// Checks that key, base URL and model are all present.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EffigyError::Configuration(
                "video API key is not configured".into(),
            ));
        }
        if normalize_base_url(&self.base_url).is_empty() {
            return Err(EffigyError::Configuration(
                "video API base URL is not configured".into(),
            ));
        }
        if self.model_name().is_empty() {
            return Err(EffigyError::Configuration(
                "video model name is not configured".into(),
            ));
        }
        Ok(())
    }

    /// Joins an API path onto the normalized base URL.
    pub fn endpoint(&self, path: &str) -> String {
        join_api_url(&self.base_url, path)
    }
}

/// Configuration for image generation; every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// API key. Falls back to `MODELSCOPE_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model identifier. Defaults to [`DEFAULT_IMAGE_MODEL`].
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL. Defaults to [`DEFAULT_IMAGE_BASE_URL`].
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ImageConfig {
    /// Environment variable consulted when no API key is set.
    pub const API_KEY_ENV: &'static str = "MODELSCOPE_API_KEY";

    /// Creates an empty config (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Resolves the API key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(Self::API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                EffigyError::Configuration(format!(
                    "{} not set and no image API key provided",
                    Self::API_KEY_ENV
                ))
            })
    }

    /// Returns the model to use.
    pub fn resolve_model(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    /// Returns the base URL to use.
    pub fn resolve_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_IMAGE_BASE_URL)
    }
}

/// Trims a base URL and rewrites known host aliases.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    HOST_ALIASES
        .iter()
        .fold(trimmed.to_string(), |url, (from, to)| url.replace(from, to))
}

/// Joins `path` onto `base_url`, collapsing a duplicated `/v1` prefix.
pub fn join_api_url(base_url: &str, path: &str) -> String {
    let normalized = normalize_base_url(base_url);
    let base = normalized.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    match path.strip_prefix("/v1") {
        Some(rest) if base.ends_with("/v1") && rest.starts_with('/') => format!("{base}{rest}"),
        _ => format!("{base}{path}"),
    }
}

/// Joins `path` onto `base_url` and appends `segment` as a single
/// percent-encoded path segment (`/` and spaces are escaped).
pub(crate) fn join_api_segment(base_url: &str, path: &str, segment: &str) -> Result<url::Url> {
    let joined = join_api_url(base_url, path);
    let mut url = url::Url::parse(&joined)
        .map_err(|e| EffigyError::Configuration(format!("invalid API base URL {joined}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| EffigyError::Configuration(format!("API base URL {joined} cannot carry a path")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
