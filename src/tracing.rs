//! Tracing (logging)

use crate::cli::CommandLineArgs;

use tracing::{event, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initlialise tracing (logging)
///
/// Applies a filter based on the `RUST_LOG` environment variable, falling back to enable debug
/// logging for this crate and tower_http if not set.
///
/// If Jaeger is enabled, spans are also exported to a Jaeger agent.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn init_tracing(args: &CommandLineArgs) {
    let (jaeger, jaeger_error) = if args.enable_jaeger {
        match opentelemetry_jaeger::new_agent_pipeline()
            .with_service_name("regionmean")
            .install_simple()
        {
            Ok(tracer) => (
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                None,
            ),
            Err(err) => (None, Some(err)),
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regionmean=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(jaeger)
        .init();

    if let Some(err) = jaeger_error {
        event!(Level::WARN, "failed to initialise Jaeger tracing: {}", err);
    }
}

/// Flush and shut down any trace exporters.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
