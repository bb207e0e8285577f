use arc_swap::ArcSwapOption;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use std::fs;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fixed filenames an ACME client (or operator) drops into the watched
/// directory. Anything else in the directory is ignored.
const FULL_CHAIN_FILE: &str = "fullchain.pem";
const PRIVATE_KEY_FILE: &str = "privkey.pem";
const WATCH_EXTENSION: &str = "pem";

/// Keeps the TLS serving certificate current without restarting the process.
///
/// Construction eagerly attempts one load, then a filesystem watcher
/// re-triggers the load whenever a `.pem` file in the directory is created
/// or modified. The certificate is held in a single atomically-swappable
/// slot: the watcher callback is the only writer, and readers (one per TLS
/// handshake) never block and never observe a half-constructed value. A
/// failed load leaves the previously published certificate in place.
pub struct CertificateLoader {
    current: Arc<ArcSwapOption<CertifiedKey>>,
    cert_dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl CertificateLoader {
    pub fn new(cert_dir: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        fs::create_dir_all(cert_dir)?;

        let current: Arc<ArcSwapOption<CertifiedKey>> = Arc::new(ArcSwapOption::empty());
        load_certificate(cert_dir, &current);

        let watch_dir = cert_dir.to_path_buf();
        let slot = Arc::clone(&current);
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_)
                    ) && event
                        .paths
                        .iter()
                        .any(|p| p.extension().is_some_and(|ext| ext == WATCH_EXTENSION));
                    if relevant {
                        load_certificate(&watch_dir, &slot);
                    }
                }
                Err(e) => warn!("Certificate watcher error: {}", e),
            })?;
        watcher.watch(cert_dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            current,
            cert_dir: cert_dir.to_path_buf(),
            _watcher: watcher,
        })
    }

    /// The currently loaded serving certificate, or `None` if no load has
    /// succeeded yet. Called on every new TLS handshake; never blocks.
    pub fn certificate(&self) -> Option<Arc<CertifiedKey>> {
        self.current.load_full()
    }

    /// Re-run a load outside the watcher, e.g. from an operator-facing
    /// reload hook.
    pub fn reload(&self) {
        load_certificate(&self.cert_dir, &self.current);
    }
}

fn load_certificate(cert_dir: &Path, slot: &ArcSwapOption<CertifiedKey>) {
    let full_chain = cert_dir.join(FULL_CHAIN_FILE);
    let private_key = cert_dir.join(PRIVATE_KEY_FILE);

    if !full_chain.exists() || !private_key.exists() {
        warn!(
            "Serving certificate files not found at {}",
            cert_dir.display()
        );
        return;
    }

    match build_certified_key(&full_chain, &private_key) {
        Ok(certified) => {
            slot.store(Some(Arc::new(certified)));
            info!("Serving certificate loaded");
        }
        Err(e) => {
            // Keep serving with the previously loaded certificate
            error!("Failed to load serving certificate: {}", e);
        }
    }
}

fn build_certified_key(cert_path: &Path, key_path: &Path) -> io::Result<CertifiedKey> {
    let cert_chain = load_cert_chain(cert_path)?;
    let private_key = load_private_key(key_path)?;
    let provider = rustls::crypto::ring::default_provider();
    CertifiedKey::from_der(cert_chain, private_key, &provider)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))
}

fn load_cert_chain(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let certs: Result<Vec<_>, _> = CertificateDer::pem_reader_iter(reader).collect();
    let certs =
        certs.map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;

    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("No certificates found in {}", path.display()),
        ));
    }

    Ok(certs)
}

fn load_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let keys: Result<Vec<_>, _> = PrivateKeyDer::pem_reader_iter(reader).collect();
    let keys = keys.map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;

    keys.into_iter().next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("No private keys found in {}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};
    use tempfile::tempdir;
    use time::OffsetDateTime;

    fn write_serving_cert(dir: &Path, domain: &str) {
        let mut params = CertificateParams::new(vec![domain.to_string()]).unwrap();
        let now = OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::days(1);
        params.not_after = now + time::Duration::days(30);
        let key_pair = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        fs::write(dir.join(FULL_CHAIN_FILE), cert.pem()).unwrap();
        fs::write(dir.join(PRIVATE_KEY_FILE), key_pair.serialize_pem()).unwrap();
    }

    fn leaf_der(loader: &CertificateLoader) -> Vec<u8> {
        loader
            .certificate()
            .unwrap()
            .cert
            .first()
            .unwrap()
            .as_ref()
            .to_vec()
    }

    #[test]
    fn test_missing_pem_files_leave_certificate_empty() {
        let dir = tempdir().unwrap();
        let loader = CertificateLoader::new(dir.path()).unwrap();
        assert!(loader.certificate().is_none());
    }

    #[test]
    fn test_eager_load_on_construction() {
        let dir = tempdir().unwrap();
        write_serving_cert(dir.path(), "idp.example.com");

        let loader = CertificateLoader::new(dir.path()).unwrap();
        assert!(loader.certificate().is_some());
    }

    #[test]
    fn test_reload_picks_up_replaced_certificate() {
        let dir = tempdir().unwrap();
        write_serving_cert(dir.path(), "idp.example.com");
        let loader = CertificateLoader::new(dir.path()).unwrap();
        let initial = leaf_der(&loader);

        write_serving_cert(dir.path(), "idp.example.org");
        loader.reload();

        assert_ne!(initial, leaf_der(&loader));
    }

    #[test]
    fn test_reload_after_first_run_failure_publishes_certificate() {
        let dir = tempdir().unwrap();
        let loader = CertificateLoader::new(dir.path()).unwrap();
        assert!(loader.certificate().is_none());

        write_serving_cert(dir.path(), "idp.example.com");
        loader.reload();

        assert!(loader.certificate().is_some());
    }

    /// Poll until `check` passes or the deadline expires.
    fn wait_for(check: impl Fn() -> bool) -> bool {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while std::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn test_watcher_reloads_on_pem_file_events() {
        let dir = tempdir().unwrap();
        let loader = CertificateLoader::new(dir.path()).unwrap();
        assert!(loader.certificate().is_none());

        // Non-pem content in the directory is ignored by the watcher
        fs::write(dir.path().join("renewal.log"), "renewal attempt").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(loader.certificate().is_none());

        // Dropping the pem pair must publish a certificate without any
        // manual reload call
        write_serving_cert(dir.path(), "idp.example.com");
        assert!(
            wait_for(|| loader.certificate().is_some()),
            "watcher never published the certificate"
        );
        let initial = leaf_der(&loader);

        // Renewing in place (modify events) must swap in the new leaf
        write_serving_cert(dir.path(), "idp.example.org");
        assert!(
            wait_for(|| leaf_der(&loader) != initial),
            "watcher never picked up the renewed certificate"
        );
    }

    #[test]
    fn test_malformed_pem_keeps_previous_certificate() {
        let dir = tempdir().unwrap();
        write_serving_cert(dir.path(), "idp.example.com");
        let loader = CertificateLoader::new(dir.path()).unwrap();
        let initial = leaf_der(&loader);

        fs::write(dir.path().join(FULL_CHAIN_FILE), "not a certificate").unwrap();
        loader.reload();

        assert_eq!(initial, leaf_der(&loader));
    }
}
