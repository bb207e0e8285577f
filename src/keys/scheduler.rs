use super::rotation::{self, HostLifetime, RotationOutcome};
use crate::config::CertificateStoreConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Background loop that runs a rotation pass over the signing-key folder and
/// the encryption-key folder on a fixed interval.
pub struct RotationScheduler {
    config: CertificateStoreConfig,
    lifetime: Arc<dyn HostLifetime>,
    check_interval: Duration,
}

impl RotationScheduler {
    pub fn new(config: CertificateStoreConfig, lifetime: Arc<dyn HostLifetime>) -> Self {
        Self {
            config,
            lifetime,
            check_interval: Duration::from_secs(3600), // Check every hour
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Run until the shutdown token fires. A pass in progress always runs to
    /// completion; only the inter-pass delay is interruptible. A failure in
    /// one folder is logged and never skips the other folder.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting key rotation scheduler");

        loop {
            for folder in [
                &self.config.signing_folder,
                &self.config.encryption_folder,
            ] {
                if shutdown.is_cancelled() {
                    info!("Key rotation scheduler stopping");
                    return;
                }
                match rotation::process_folder(
                    Path::new(folder),
                    self.config.grace_days,
                    self.lifetime.as_ref(),
                ) {
                    Ok(RotationOutcome::Rotated { kid }) => {
                        info!(%kid, folder = %folder, "Rotated key, restart requested");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(folder = %folder, "Error rotating certificates: {}", e);
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Key rotation scheduler stopping");
                    return;
                }
                _ = sleep(self.check_interval) => {}
            }
        }
    }
}
