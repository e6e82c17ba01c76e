//! Serve command implementation.

use clap::Parser;
use sdtrainer_server::{shutdown_signal, DEFAULT_CALLBACK_PORT};
use sdtrainer_service::{bind_callback_server, serve_callbacks};
use tracing::info;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::EventPrinter;

/// Run the training callback server
///
/// Training runs report saved models and progress here. Saved models are
/// recorded in the open project and get a preview rendered.
#[derive(Debug, Parser)]
pub struct ServeCommand {
    /// First port tried; the next free one is used when it is taken
    #[arg(long, env = "SDTRAINER_CALLBACK_PORT", default_value_t = DEFAULT_CALLBACK_PORT)]
    port: u16,
}

impl ServeCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let view = ctx.open_project().await?;
        let server = bind_callback_server(&ctx.app, self.port).await?;
        info!(project = %view.path.display(), url = %server.callback_url(), "serving training callbacks");
        if !ctx.is_json() {
            println!("listening on {}", server.callback_url());
        }
        let printer = EventPrinter::start(ctx.app.bus(), ctx.format);
        let served = serve_callbacks(ctx.app.clone(), server, shutdown_signal()).await;
        printer.finish().await;
        Ok(served?)
    }
}
