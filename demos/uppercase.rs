//! Uppercase plugin - a minimal formatting plugin.
//!
//! This example demonstrates:
//! - Implementing [`PluginHandler`] with a typed configuration
//! - Reporting configuration diagnostics
//! - Honouring cancellation between chunks of work
//! - Running the plugin with [`run_plugin`]
//!
//! # Running
//!
//! The host launches the binary with the id of its own process:
//!
//! ```text
//! ./target/debug/examples/uppercase --parent-pid 4242
//! ```
//!
//! Set `FORMATWIRE_LOG=debug` to see protocol traffic on stderr.

use std::process::ExitCode;

use formatwire_plugin::config::JsonObject;
use formatwire_plugin::handler::{
    BoxFuture, ConfigDiagnostic, FormatRequest, FormatResult, PluginHandler, PluginInfo,
    ResolveConfigResult,
};
use formatwire_plugin::run_plugin;
use serde::Serialize;

/// Resolved configuration for the uppercase plugin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UppercaseConfig {
    line_width: u64,
    trim_trailing_whitespace: bool,
}

struct UppercasePlugin;

impl PluginHandler for UppercasePlugin {
    type Config = UppercaseConfig;

    fn plugin_info(&self) -> PluginInfo {
        let mut info = PluginInfo::new("uppercase", env!("CARGO_PKG_VERSION"), "uppercase");
        info.file_extensions = vec!["txt".to_string()];
        info
    }

    fn license_text(&self) -> String {
        "MIT".to_string()
    }

    fn resolve_config(
        &self,
        plugin_config: &JsonObject,
        global_config: &JsonObject,
    ) -> ResolveConfigResult<UppercaseConfig> {
        let mut diagnostics = Vec::new();

        let line_width = match plugin_config.get("lineWidth").or_else(|| global_config.get("lineWidth")) {
            None => 120,
            Some(value) => value.as_u64().unwrap_or_else(|| {
                diagnostics.push(ConfigDiagnostic::new("lineWidth", "Expected a positive number"));
                120
            }),
        };
        let trim_trailing_whitespace = match plugin_config.get("trimTrailingWhitespace") {
            None => true,
            Some(value) => value.as_bool().unwrap_or_else(|| {
                diagnostics.push(ConfigDiagnostic::new("trimTrailingWhitespace", "Expected a boolean"));
                true
            }),
        };
        for key in plugin_config.keys() {
            if !matches!(key.as_str(), "lineWidth" | "trimTrailingWhitespace") {
                diagnostics.push(ConfigDiagnostic::new(key.clone(), "Unknown property"));
            }
        }

        ResolveConfigResult::new(UppercaseConfig {
            line_width,
            trim_trailing_whitespace,
        })
        .with_diagnostics(diagnostics)
    }

    fn format_text(&self, request: FormatRequest<UppercaseConfig>) -> BoxFuture<'_, FormatResult> {
        Box::pin(async move {
            let mut output = String::with_capacity(request.file_text.len());
            for line in request.file_text.split_inclusive('\n') {
                if request.is_cancelled() {
                    return Ok(None);
                }
                let (body, newline) = match line.strip_suffix('\n') {
                    Some(body) => (body, "\n"),
                    None => (line, ""),
                };
                let body = if request.config.trim_trailing_whitespace {
                    body.trim_end()
                } else {
                    body
                };
                output.push_str(&body.to_uppercase());
                output.push_str(newline);
                tokio::task::yield_now().await;
            }

            Ok((output != request.file_text).then_some(output))
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    run_plugin(UppercasePlugin).await
}
