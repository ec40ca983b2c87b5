//! This file defines the regionmean binary entry point.

use regionmean::app;
use regionmean::app_state::AppState;
use regionmean::cli;
use regionmean::metrics;
use regionmean::server;
use regionmean::tracing;

use std::process::exit;
use std::sync::Arc;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing(&args);
    ::tracing::debug!("{:?}", args);
    metrics::register_metrics();
    app::init(&args);
    let state = match AppState::new(&args) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            ::tracing::error!("failed to initialise: {}", err);
            tracing::shutdown_tracing();
            exit(1)
        }
    };
    let service = app::service(state);
    if let Err(err) = server::serve(&args, service).await {
        ::tracing::error!("server error: {}", err);
        tracing::shutdown_tracing();
        exit(1)
    }
    tracing::shutdown_tracing();
}
