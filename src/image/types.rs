//! Core types for image generation.

use crate::error::{sanitize_error_message, EffigyError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Image formats accepted as input images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Encodes raw image bytes as a `data:image/...;base64,` URI.
///
/// Fails with a validation error if the bytes are not PNG, JPEG or WebP.
pub fn data_uri(bytes: &[u8]) -> Result<String> {
    let format = ImageFormat::from_magic_bytes(bytes).ok_or_else(|| {
        EffigyError::Validation("input image is not a PNG, JPEG or WebP file".into())
    })?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{encoded}", format.mime_type()))
}

/// A request to generate an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Reference image (URL or data URI) for image-to-image models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_image: Option<String>,
}

impl ImageRequest {
    /// Creates a text-only request.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            input_image: None,
        }
    }

    /// Sets the reference image. Blank values are ignored.
    pub fn with_input_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        self.input_image = (!image.trim().is_empty()).then_some(image);
        self
    }

    /// Fails if the prompt is blank.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(EffigyError::Validation("prompt must not be empty".into()));
        }
        Ok(())
    }
}

type ShapeParser = fn(&Value) -> Option<String>;

/// Known response shapes, in the order they are tried.
const RESPONSE_SHAPES: &[(&str, ShapeParser)] = &[
    ("data[0]", from_data_array),
    ("output_images[0]", from_output_images),
    ("images[0]", from_images),
    ("output.images[0]", from_output_nested),
    ("result.images[0]", from_result_nested),
    ("direct URL", from_direct_url),
];

/// Extracts the generated image URL from a response body.
///
/// Returns the name of the matching shape alongside the URL. Base64
/// payloads come back as PNG data URIs.
pub fn parse_image_response(body: &Value) -> Option<(&'static str, String)> {
    RESPONSE_SHAPES
        .iter()
        .find_map(|(name, parse)| parse(body).map(|url| (*name, url)))
}

/// Like [`parse_image_response`], but an unrecognized body is a protocol error.
pub fn extract_image_url(body: &Value) -> Result<String> {
    match parse_image_response(body) {
        Some((shape, url)) => {
            tracing::debug!(shape, "found generated image");
            Ok(url)
        }
        None => Err(EffigyError::Protocol(format!(
            "no generated image in response: {}",
            sanitize_error_message(&body.to_string().chars().take(200).collect::<String>())
        ))),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn from_data_array(body: &Value) -> Option<String> {
    let first = body.pointer("/data/0")?;
    non_empty_str(first.get("url")).or_else(|| {
        non_empty_str(first.get("b64_json")).map(|b64| format!("data:image/png;base64,{b64}"))
    })
}

fn from_output_images(body: &Value) -> Option<String> {
    non_empty_str(body.pointer("/output_images/0"))
}

fn from_images(body: &Value) -> Option<String> {
    let first = body.pointer("/images/0")?;
    non_empty_str(Some(first)).or_else(|| non_empty_str(first.get("url")))
}

fn from_output_nested(body: &Value) -> Option<String> {
    non_empty_str(body.pointer("/output/images/0"))
}

fn from_result_nested(body: &Value) -> Option<String> {
    non_empty_str(body.pointer("/result/images/0"))
}

fn from_direct_url(body: &Value) -> Option<String> {
    body.as_str()
        .map(str::trim)
        .filter(|s| s.starts_with("http"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_detection() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(ImageFormat::from_magic_bytes(&png), Some(ImageFormat::Png));

        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(ImageFormat::from_magic_bytes(&jpeg), Some(ImageFormat::Jpeg));

        let webp = *b"RIFF\0\0\0\0WEBP";
        assert_eq!(ImageFormat::from_magic_bytes(&webp), Some(ImageFormat::WebP));

        assert_eq!(ImageFormat::from_magic_bytes(b"short"), None);
    }

    #[test]
    fn test_data_uri() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
        let uri = data_uri(&jpeg).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,/9j/4A"));

        assert!(matches!(
            data_uri(b"not an image at all"),
            Err(EffigyError::Validation(_))
        ));
    }

    #[test]
    fn test_request_input_image() {
        let req = ImageRequest::new("boss").with_input_image("  ");
        assert!(req.input_image.is_none());
        let req = req.with_input_image("https://x/in.png");
        assert_eq!(req.input_image.as_deref(), Some("https://x/in.png"));

        assert!(ImageRequest::new(" ").validate().is_err());
    }

    #[test]
    fn test_each_shape() {
        let cases = [
            (json!({"data": [{"url": "https://x/1.png"}]}), "data[0]", "https://x/1.png"),
            (
                json!({"data": [{"b64_json": "iVBOR"}]}),
                "data[0]",
                "data:image/png;base64,iVBOR",
            ),
            (
                json!({"output_images": ["https://x/2.png"]}),
                "output_images[0]",
                "https://x/2.png",
            ),
            (json!({"images": ["https://x/3.png"]}), "images[0]", "https://x/3.png"),
            (
                json!({"images": [{"url": "https://x/4.png"}]}),
                "images[0]",
                "https://x/4.png",
            ),
            (
                json!({"output": {"images": ["https://x/5.png"]}}),
                "output.images[0]",
                "https://x/5.png",
            ),
            (
                json!({"result": {"images": ["https://x/6.png"]}}),
                "result.images[0]",
                "https://x/6.png",
            ),
            (json!("https://x/7.png"), "direct URL", "https://x/7.png"),
        ];
        for (body, shape, url) in cases {
            assert_eq!(
                parse_image_response(&body),
                Some((shape, url.to_string())),
                "{body}"
            );
        }
    }

    #[test]
    fn test_shape_precedence() {
        let body = json!({
            "result": {"images": ["https://x/result.png"]},
            "output_images": ["https://x/output.png"],
            "data": [{"url": "https://x/data.png", "b64_json": "AAAA"}]
        });
        assert_eq!(extract_image_url(&body).unwrap(), "https://x/data.png");

        // An empty data entry falls through to later shapes.
        let body = json!({"data": [{}], "images": [{"url": "https://x/img.png"}]});
        assert_eq!(extract_image_url(&body).unwrap(), "https://x/img.png");
    }

    #[test]
    fn test_unrecognized_response() {
        for body in [json!({"data": []}), json!("not a url"), json!({"ok": true})] {
            assert!(matches!(
                extract_image_url(&body),
                Err(EffigyError::Protocol(_))
            ));
        }
    }
}
