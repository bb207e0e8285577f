use keyrot::config;
use keyrot::keys::{RestartChannel, RotationScheduler};
use keyrot::tls::CertificateLoader;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyrot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match config::load_config_with_fallback() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // TLS hot-reload, kept alive for the life of the process. The network
    // listener (out of scope here) reads `certificate()` per handshake.
    let _tls_loader = match &config.tls {
        Some(tls) => match CertificateLoader::new(Path::new(&tls.cert_path)) {
            Ok(loader) => {
                if loader.certificate().is_none() {
                    tracing::warn!("No serving certificate available yet");
                }
                Some(loader)
            }
            Err(e) => {
                tracing::error!("Failed to start TLS certificate loader: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let (lifetime, mut restart_rx) = RestartChannel::new();
    let scheduler = RotationScheduler::new(config.certificate_store.clone(), Arc::new(lifetime));

    let shutdown = CancellationToken::new();
    let scheduler_token = shutdown.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_token).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
        _ = restart_rx.recv() => {
            // Key material is only read at boot; exit so the supervisor
            // restarts the process with the new key set.
            tracing::info!("Keys rotated, restarting to reload key material");
        }
    }

    shutdown.cancel();
    let _ = scheduler_handle.await;
}
