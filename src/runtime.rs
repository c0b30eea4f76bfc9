//! Process entry point for plugin binaries.
//!
//! # Example
//!
//! ```ignore
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::process::ExitCode {
//!     formatwire_plugin::run_plugin(MyPlugin).await
//! }
//! ```

use std::process::ExitCode;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::control::{spawn_parent_process_checker, CliArgs};
use crate::handler::PluginHandler;
use crate::processor::{MessageProcessor, ProcessorBuilder};
use crate::telemetry;

/// Run `handler` as a plugin process on stdin/stdout.
///
/// Parses [`CliArgs`] from the process arguments; invalid arguments
/// print usage and exit.
pub async fn run_plugin<H: PluginHandler>(handler: H) -> ExitCode {
    run_plugin_with(MessageProcessor::builder(handler)).await
}

/// Like [`run_plugin`], with a configured builder.
pub async fn run_plugin_with<H: PluginHandler>(builder: ProcessorBuilder<H>) -> ExitCode {
    let args = match CliArgs::from_env() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };
    match run_with_args(builder, args, tokio::io::stdin(), tokio::io::stdout()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("plugin stopped: {:#}", e);
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run a plugin with already parsed arguments on the given streams.
///
/// Returns once `Shutdown` is acknowledged, or right away in `--init`
/// mode. An error means the protocol stream failed.
pub async fn run_with_args<H, R, W>(
    builder: ProcessorBuilder<H>,
    args: CliArgs,
    reader: R,
    writer: W,
) -> anyhow::Result<()>
where
    H: PluginHandler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    telemetry::initialise(args.log_filter.as_deref()).context("failed to initialise logging")?;

    if args.init {
        tracing::info!("initialisation complete");
        return Ok(());
    }

    let processor = builder.build();
    let parent_checker =
        spawn_parent_process_checker(args.parent_process_id, processor.parent_check_interval());

    let result = processor.run(reader, writer).await;
    parent_checker.abort();

    result.context("protocol stream failed")
}
