//! Control module - everything around the message loop.
//!
//! - [`establish_schema_version`] - the handshake preceding all messages
//! - [`CliArgs`] - command-line surface the host launches the plugin with
//! - [`spawn_parent_process_checker`] - exits when the host process dies
//!
//! # Workflow
//!
//! 1. Host starts the plugin with `--parent-pid <pid>`
//! 2. Plugin starts watching the parent process
//! 3. Host sends `0` on stdin asking for the schema version
//! 4. Plugin answers `0` (ok) and `4` (schema version) on stdout
//! 5. Binary messages flow until `Shutdown`

mod cli;
mod handshake;
mod parent;

pub use cli::CliArgs;
pub use handshake::{establish_schema_version, SCHEMA_VERSION, SCHEMA_VERSION_REQUEST};
pub use parent::{is_process_running, spawn_parent_process_checker, DEFAULT_PARENT_CHECK_INTERVAL};
