//! Video provider dialects.

mod apimart;
mod legacy;

pub use apimart::ApimartAdapter;
pub use legacy::LegacyAdapter;

use crate::error::{EffigyError, Result};
use serde::Serialize;
use serde_json::Value;

/// Serializes a request body.
pub(crate) fn to_json<T: Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| EffigyError::Protocol(format!("failed to encode request body: {e}")))
}

