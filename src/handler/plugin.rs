//! The contract a formatting engine implements.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::FormatRequest;
use crate::config::JsonObject;

/// Boxed future returned by [`PluginHandler::format_text`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one format operation.
///
/// `Ok(None)` means the file needs no changes.
pub type FormatResult = anyhow::Result<Option<String>>;

/// Static description of the plugin, sent as JSON for `GetPluginInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    /// Key of this plugin's section in the host configuration file.
    pub config_key: String,
    pub file_extensions: Vec<String>,
    pub help_url: String,
    pub config_schema_url: String,
    pub update_url: String,
}

impl PluginInfo {
    /// Create plugin info with empty extension list and URLs.
    pub fn new(name: &str, version: &str, config_key: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            config_key: config_key.to_string(),
            file_extensions: Vec::new(),
            help_url: String::new(),
            config_schema_url: String::new(),
            update_url: String::new(),
        }
    }
}

/// A problem found while resolving configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDiagnostic {
    pub property_name: String,
    pub message: String,
}

impl ConfigDiagnostic {
    pub fn new(property_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            message: message.into(),
        }
    }
}

/// Resolved configuration plus any diagnostics produced on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveConfigResult<C> {
    pub config: C,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

impl<C> ResolveConfigResult<C> {
    /// A result without diagnostics.
    pub fn new(config: C) -> Self {
        Self {
            config,
            diagnostics: Vec::new(),
        }
    }

    /// Attach diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: Vec<ConfigDiagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// A formatting engine driven by the message processor.
///
/// Everything except [`format_text`](PluginHandler::format_text) is
/// called synchronously from the dispatch loop and should return quickly.
pub trait PluginHandler: Send + Sync + 'static {
    /// Resolved configuration type. Serialized for `GetResolvedConfig`.
    type Config: Serialize + Send + Sync + 'static;

    /// Describe the plugin.
    fn plugin_info(&self) -> PluginInfo;

    /// License text of the plugin.
    fn license_text(&self) -> String;

    /// Resolve raw configuration. Must be pure: results are cached per
    /// config id.
    fn resolve_config(
        &self,
        plugin_config: &JsonObject,
        global_config: &JsonObject,
    ) -> ResolveConfigResult<Self::Config>;

    /// Format one file.
    ///
    /// Implementations should check `request.token` at convenient points
    /// and stop early once it is cancelled.
    fn format_text(&self, request: FormatRequest<Self::Config>) -> BoxFuture<'_, FormatResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_info_json_uses_camel_case() {
        let mut info = PluginInfo::new("upper", "1.2.3", "upper");
        info.file_extensions = vec!["txt".to_string()];
        info.help_url = "https://example.com/help".to_string();

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["configKey"], "upper");
        assert_eq!(json["fileExtensions"][0], "txt");
        assert_eq!(json["helpUrl"], "https://example.com/help");
        assert_eq!(json["configSchemaUrl"], "");
        assert_eq!(json["updateUrl"], "");
    }

    #[test]
    fn test_diagnostic_json() {
        let diagnostic = ConfigDiagnostic::new("lineWidth", "Expected a number");
        assert_eq!(
            serde_json::to_string(&diagnostic).unwrap(),
            r#"{"propertyName":"lineWidth","message":"Expected a number"}"#
        );
    }
}
