//! HTTP server: binds the configured port and serves the router built by
//! `memoria-api`, shutting down gracefully when the shared cancellation
//! token fires (e.g. on SIGINT) so in-flight workers get a chance to drain.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Args;

pub struct Server {
    args: Args,
    state: memoria_api::AppState,
}

impl Server {
    pub fn new(args: Args, state: memoria_api::AppState) -> Result<Self> {
        Ok(Self { args, state })
    }

    pub async fn run(self, cancellation: CancellationToken) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.args.port));
        let app = memoria_api::create_router(self.state);

        info!("HTTP server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind HTTP server")?;

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal(cancellation))
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

async fn shutdown_signal(cancellation: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = cancellation.cancelled() => {},
    }
}
