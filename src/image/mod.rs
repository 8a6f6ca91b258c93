//! Image generation: request types, response-shape parsing and providers.

pub mod prompts;
pub mod providers;
mod types;

pub use types::{data_uri, extract_image_url, parse_image_response, ImageFormat, ImageRequest};
