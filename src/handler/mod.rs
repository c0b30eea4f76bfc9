//! Handler module - the formatting engine contract and per-request state.
//!
//! Provides:
//! - [`PluginHandler`] - implemented by the formatting engine
//! - [`FormatRequest`] - everything one format operation needs
//! - [`InFlightRegistry`] - cancellation handles for running operations
//!
//! # Example
//!
//! ```
//! use formatwire_plugin::config::JsonObject;
//! use formatwire_plugin::handler::{
//!     BoxFuture, FormatRequest, FormatResult, PluginHandler, PluginInfo, ResolveConfigResult,
//! };
//!
//! struct Upper;
//!
//! impl PluginHandler for Upper {
//!     type Config = JsonObject;
//!
//!     fn plugin_info(&self) -> PluginInfo {
//!         PluginInfo::new("upper", "0.1.0", "upper")
//!     }
//!
//!     fn license_text(&self) -> String {
//!         "MIT".to_string()
//!     }
//!
//!     fn resolve_config(
//!         &self,
//!         plugin_config: &JsonObject,
//!         _global_config: &JsonObject,
//!     ) -> ResolveConfigResult<JsonObject> {
//!         ResolveConfigResult::new(plugin_config.clone())
//!     }
//!
//!     fn format_text(&self, request: FormatRequest<JsonObject>) -> BoxFuture<'_, FormatResult> {
//!         Box::pin(async move {
//!             let upper = request.file_text.to_uppercase();
//!             Ok((upper != request.file_text).then_some(upper))
//!         })
//!     }
//! }
//! ```

mod context;
mod in_flight;
mod plugin;

pub use context::{translate_range, FormatRequest};
pub use in_flight::{InFlightGuard, InFlightRegistry};
pub use plugin::{
    BoxFuture, ConfigDiagnostic, FormatResult, PluginHandler, PluginInfo, ResolveConfigResult,
};
