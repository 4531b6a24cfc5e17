mod app;
mod cli;
mod server;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use crate::app::App;
use crate::cli::Args;
use crate::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let _guards = init_telemetry(&args)?;

    info!("starting memoria server");
    info!("version: {}", env!("CARGO_PKG_VERSION"));
    info!("environment: {}", args.env);

    let result = run_application(args).await;

    if let Err(ref e) = result {
        error!("application error: {:#}", e);
    }

    info!("server shutdown complete");
    result
}

async fn run_application(args: Args) -> Result<()> {
    let app = App::build(args).await?;
    app.run().await?;
    Ok(())
}
