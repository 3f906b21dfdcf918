//! VAPID identity for Web Push (RFC 8292).
//!
//! The service signs every push request with one process-wide P-256 key.
//! The identity (contact subject plus key pair) is read from the environment
//! once at startup, validated here, and then shared read-only.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use serde::{Deserialize, Serialize};

/// VAPID keypair for web push authentication.
///
/// The private key is the raw 32-byte P-256 scalar (base64url), which is the
/// form `web_push::VapidSignatureBuilder::from_base64()` expects. The public
/// key is the uncompressed SEC1 point (65 bytes).
#[derive(Clone, Serialize, Deserialize)]
pub struct VapidKeys {
    /// Raw 32-byte P-256 private key scalar (base64url).
    private_key_b64: String,
    /// Uncompressed public key bytes (base64url, 65 bytes decoded).
    public_key_b64: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key_b64", &self.public_key_b64)
            .field("private_key_b64", &"<redacted>")
            .finish()
    }
}

impl VapidKeys {
    /// Generate a fresh VAPID keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        Self::from_signing_key(&signing_key)
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        // SEC1 uncompressed public key (65 bytes: 0x04 || x || y)
        let public_bytes = signing_key.verifying_key().to_encoded_point(false);
        Self {
            private_key_b64: BASE64URL.encode(signing_key.to_bytes().as_slice()),
            public_key_b64: BASE64URL.encode(public_bytes.as_bytes()),
        }
    }

    /// Reconstruct from base64url-encoded strings.
    ///
    /// The private key may be the raw 32-byte scalar, SEC1 DER or PKCS8 DER
    /// (the latter two are what `openssl ecparam`/`openssl pkcs8` produce);
    /// it is normalized to the raw scalar. The public key must be the
    /// uncompressed point that belongs to the private key.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str) -> Result<Self> {
        let pub_bytes = BASE64URL
            .decode(public_key_b64.trim().trim_end_matches('='))
            .context("Invalid base64url for VAPID public key")?;
        anyhow::ensure!(
            pub_bytes.len() == 65 && pub_bytes[0] == 0x04,
            "VAPID public key must be 65-byte uncompressed P-256 point"
        );

        let priv_bytes = BASE64URL
            .decode(private_key_b64.trim().trim_end_matches('='))
            .context("Invalid base64url for VAPID private key")?;
        let signing_key = decode_signing_key(&priv_bytes)?;

        let keys = Self::from_signing_key(&signing_key);
        anyhow::ensure!(
            keys.public_key_bytes()? == pub_bytes,
            "VAPID public key does not match the private key"
        );

        Ok(keys)
    }

    /// Base64url-encoded uncompressed public key (65 bytes decoded).
    ///
    /// This is what browsers pass as `applicationServerKey` when subscribing.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    /// Base64url-encoded raw 32-byte private key scalar.
    pub fn private_key_base64url(&self) -> &str {
        &self.private_key_b64
    }

    /// Environment assignments that configure this key pair with `subject`.
    pub fn env_lines(&self, subject: &str) -> String {
        format!(
            "VAPID_SUBJECT={subject}\nVAPID_PUBLIC_KEY={}\nVAPID_PRIVATE_KEY={}\n",
            self.public_key_b64, self.private_key_b64
        )
    }

    /// Uncompressed public key bytes (65 bytes).
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        BASE64URL
            .decode(&self.public_key_b64)
            .context("Failed to decode VAPID public key")
    }
}

/// Accept a raw scalar, SEC1 DER or PKCS8 DER private key.
fn decode_signing_key(priv_bytes: &[u8]) -> Result<SigningKey> {
    if priv_bytes.len() == 32 {
        return SigningKey::from_bytes(priv_bytes.into())
            .context("VAPID private key is not a valid P-256 scalar");
    }

    if let Ok(sk) = p256::SecretKey::from_sec1_der(priv_bytes) {
        log::info!(
            "[WebPush] VAPID private key given as SEC1 DER ({} bytes), using raw scalar",
            priv_bytes.len()
        );
        return Ok(SigningKey::from(sk));
    }

    use p256::pkcs8::DecodePrivateKey;
    let sk = SigningKey::from_pkcs8_der(priv_bytes)
        .context("VAPID private key is not valid 32-byte scalar, SEC1 DER, or PKCS8 DER")?;
    log::info!(
        "[WebPush] VAPID private key given as PKCS8 DER ({} bytes), using raw scalar",
        priv_bytes.len()
    );
    Ok(sk)
}

/// Process-wide sender identity: contact subject plus signing keys.
///
/// Constructed once at startup and injected into the dispatcher. Holding a
/// `VapidIdentity` means the keys have already been validated.
#[derive(Debug, Clone)]
pub struct VapidIdentity {
    subject: String,
    keys: VapidKeys,
}

impl VapidIdentity {
    /// Build an identity from its three configured parts.
    ///
    /// The subject must be a `mailto:` or `https:` URI so push services can
    /// contact the sender.
    pub fn new(subject: &str, public_key_b64: &str, private_key_b64: &str) -> Result<Self> {
        let subject = subject.trim();
        anyhow::ensure!(
            subject.starts_with("mailto:") || subject.starts_with("https://"),
            "VAPID subject must be a mailto: or https:// URI, got {subject:?}"
        );
        let keys = VapidKeys::from_base64url(public_key_b64, private_key_b64)?;
        Ok(Self {
            subject: subject.to_string(),
            keys,
        })
    }

    /// Contact URI placed in the JWT `sub` claim.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The validated key pair.
    pub fn keys(&self) -> &VapidKeys {
        &self.keys
    }
}
