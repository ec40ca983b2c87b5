//! Web server

use crate::cli;

use std::{io, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use axum::ServiceExt;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use expanduser::expanduser;
use tokio::signal;
use tracing::{event, Level};

/// Serve the region mean service
///
/// Returns once the server has shut down.
///
/// # Arguments
///
/// * `args`: Command line arguments
/// * `service`: The [crate::app::Service] to serve
pub async fn serve(args: &cli::CommandLineArgs, service: crate::app::Service) -> io::Result<()> {
    let addr = SocketAddr::from_str(&format!("{}:{}", args.host, args.port)).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid host name, IP address or port number: {err}"),
        )
    })?;

    // Catch ctrl+c and try to shutdown gracefully
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(
        handle.clone(),
        args.graceful_shutdown_timeout,
    ));

    if args.https {
        let cert_file = tls_file(&args.cert_file, "certificate")?;
        let key_file = tls_file(&args.key_file, "key")?;
        let tls_config = RustlsConfig::from_pem_file(cert_file, key_file).await?;
        event!(Level::INFO, "listening on https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(service.into_make_service())
            .await
    } else {
        event!(Level::INFO, "listening on http://{}", addr);
        axum_server::bind(addr)
            .handle(handle)
            .serve(service.into_make_service())
            .await
    }
}

/// Expand and check a TLS file path.
fn tls_file(path: &str, kind: &str) -> io::Result<PathBuf> {
    let abs_path = expanduser(path)?;
    if !abs_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!(
                "TLS {kind} file expected at '{}' but not found",
                abs_path.display()
            ),
        ));
    }
    abs_path.canonicalize()
}

/// Graceful shutdown handler
///
/// Installs signal handlers to catch Ctrl-C or SIGTERM and trigger a graceful shutdown.
async fn shutdown_signal(handle: Handle, timeout: u64) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            event!(Level::ERROR, "failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                event!(Level::ERROR, "failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    event!(
        Level::INFO,
        "signal received, starting graceful shutdown (timeout {}s)",
        timeout
    );
    handle.graceful_shutdown(Some(Duration::from_secs(timeout)));
}
