use super::generator;
use super::manifest::{self, KeyStatus};
use chrono::{Duration, Utc};
use std::fs;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Signal asking the host process to restart so the token-issuance
/// subsystem, which reads key material only at boot, picks up the new key
/// set. This is control flow on a successful rotation, not an error path.
pub trait HostLifetime: Send + Sync {
    fn request_restart(&self);
}

/// [`HostLifetime`] that publishes restart requests on a channel the host
/// drains; the host decides how to act on it (typically: stop and let the
/// supervisor restart the process).
pub struct RestartChannel {
    tx: mpsc::UnboundedSender<()>,
}

impl RestartChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostLifetime for RestartChannel {
    fn request_restart(&self) {
        // Receiver gone means the host is already shutting down
        let _ = self.tx.send(());
    }
}

/// Result of one rotation pass over a key folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// A new active key was minted; the host was asked to restart
    Rotated { kid: String },
    /// Pruning (if any) was committed, the active key is still current
    NoChange,
    /// The folder path was empty, nothing to do
    Skipped,
}

/// One prune-then-maybe-rotate-then-persist pass over a key folder.
///
/// The manifest file is only overwritten after all in-memory mutation for
/// the pass succeeded, so a failure mid-pass leaves the on-disk manifest as
/// of the previous completed pass.
pub fn process_folder(
    folder: &Path,
    grace_days: u32,
    lifetime: &dyn HostLifetime,
) -> Result<RotationOutcome, Box<dyn std::error::Error + Send + Sync>> {
    if folder.as_os_str().is_empty() {
        return Ok(RotationOutcome::Skipped);
    }
    fs::create_dir_all(folder)?;

    let manifest = manifest::load(folder)?;
    let now = Utc::now();

    // Prune grace keys whose grace window has passed. The keystore file is
    // deleted before the entry leaves the in-memory list, so a failed delete
    // aborts the pass and the same deletion is attempted on the next tick.
    let mut kept = Vec::with_capacity(manifest.len());
    for entry in manifest {
        let expired = entry.status == KeyStatus::Grace
            && entry.grace_until.is_some_and(|until| until <= now);
        if expired {
            let keystore = Path::new(&entry.path);
            if keystore.exists() {
                fs::remove_file(keystore)?;
            }
            debug!(kid = %entry.kid, "pruned expired grace key");
        } else {
            kept.push(entry);
        }
    }
    let mut manifest = kept;

    // Rotate when no key is active or the active key has aged out. If the
    // manifest somehow holds several active entries, any one decides.
    let rotation_due = match manifest.iter().find(|e| e.status == KeyStatus::Active) {
        None => true,
        Some(active) => active.rotate_after <= now,
    };

    if rotation_due {
        info!(folder = %folder.display(), "Generating new certificate");
        let new_entry = generator::generate(folder)?;
        let grace_until = now + Duration::days(i64::from(grace_days));
        for entry in &mut manifest {
            if entry.status == KeyStatus::Active {
                entry.status = KeyStatus::Grace;
                entry.grace_until = Some(grace_until);
            }
        }
        // Appended last so consumers registering in order prefer it
        manifest.push(new_entry.clone());
        manifest::save(folder, &manifest)?;
        lifetime.request_restart();
        return Ok(RotationOutcome::Rotated { kid: new_entry.kid });
    }

    manifest::save(folder, &manifest)?;
    Ok(RotationOutcome::NoChange)
}
