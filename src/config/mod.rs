//! Configuration module - JSON objects and the per-id resolution cache.
//!
//! The host registers raw global and plugin configuration under a numeric
//! id. Resolution into the plugin's own config type is delegated to the
//! [`PluginHandler`](crate::handler::PluginHandler) and memoized per id.

mod cache;

pub use cache::{ConfigCache, ConfigResolver};

use crate::error::{PluginError, Result};

/// A JSON object as sent by the host.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Parse bytes as a JSON object.
///
/// Valid JSON that is not an object (arrays, strings, `null`, ...) is
/// rejected.
pub fn parse_json_object(data: &[u8]) -> Result<JsonObject> {
    match serde_json::from_slice::<serde_json::Value>(data)? {
        serde_json::Value::Object(object) => Ok(object),
        _ => Err(PluginError::InvalidRequest(
            "Expected JSON object".to_string(),
        )),
    }
}

/// Parse a per-request override.
///
/// A zero-length blob and `{}` both mean "no override".
pub fn parse_override_config(data: &[u8]) -> Result<Option<JsonObject>> {
    if data.is_empty() {
        return Ok(None);
    }
    let object = parse_json_object(data)?;
    Ok((!object.is_empty()).then_some(object))
}

/// Overlay `override_config` onto `plugin_config`, key by key.
pub fn merge_override(plugin_config: &JsonObject, override_config: &JsonObject) -> JsonObject {
    let mut merged = plugin_config.clone();
    for (key, value) in override_config {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
