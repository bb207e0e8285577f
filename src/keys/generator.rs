use super::manifest::{KeyManifestEntry, KeyStatus};
use chrono::{Duration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

/// Days before a freshly minted key should stop signing.
pub const ROTATION_INTERVAL_DAYS: i64 = 30;

/// Certificate validity in days. Deliberately longer than the rotation
/// interval so a key in its grace period stays cryptographically valid for
/// verification.
const CERT_VALIDITY_DAYS: i64 = 365;

/// Clock-skew tolerance between issuance and first use.
const BACKDATE_MINUTES: i64 = 5;

/// Generate a new self-signed P-256 key pair, export it to a keystore file
/// named by its thumbprint inside `folder`, and return the Active manifest
/// entry describing it.
pub fn generate(
    folder: &Path,
) -> Result<KeyManifestEntry, Box<dyn std::error::Error + Send + Sync>> {
    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "keyrot");
    params.distinguished_name = dn;

    let now = OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::minutes(BACKDATE_MINUTES);
    params.not_after = now + time::Duration::days(CERT_VALIDITY_DAYS);

    let cert = params.self_signed(&key_pair)?;

    let kid = hex::encode(Sha256::digest(cert.der()));
    let path = folder.join(format!("{}.pem", kid));

    // Keystore bundle: certificate followed by the PKCS#8 private key
    let bundle = format!("{}{}", cert.pem(), key_pair.serialize_pem());
    fs::write(&path, bundle)?;

    let created_at = Utc::now();
    Ok(KeyManifestEntry {
        kid,
        path: path.to_string_lossy().into_owned(),
        created_at,
        rotate_after: created_at + Duration::days(ROTATION_INTERVAL_DAYS),
        grace_until: None,
        status: KeyStatus::Active,
    })
}
