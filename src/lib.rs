//! # formatwire-plugin
//!
//! Plugin-side runtime for the stdio formatting plugin protocol,
//! schema version 4.
//!
//! A host process launches the plugin, answers nothing until it asks for
//! the schema version, then drives it with binary messages on
//! stdin/stdout: configuration registration, format requests,
//! cancellation and shutdown. This crate speaks that protocol and hands
//! the actual formatting to a [`PluginHandler`].
//!
//! ## Architecture
//!
//! - **Dispatch loop**: reads one message at a time and answers
//!   synchronous requests before reading the next
//! - **Format tasks**: each `FormatText` runs concurrently and can be
//!   cancelled by id
//! - **Writer task**: the only owner of stdout; serialises every outbound
//!   message and assigns outbound ids
//!
//! ## Example
//!
//! ```ignore
//! use formatwire_plugin::run_plugin;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::process::ExitCode {
//!     run_plugin(MyPlugin).await
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod handler;
pub mod manifest;
pub mod processor;
pub mod protocol;
pub mod runtime;
pub mod telemetry;
pub mod writer;

pub use error::{PluginError, Result};
pub use handler::{FormatRequest, PluginHandler, PluginInfo, ResolveConfigResult};
pub use manifest::PluginManifest;
pub use processor::{MessageProcessor, ProcessorBuilder};
pub use runtime::{run_plugin, run_plugin_with};
