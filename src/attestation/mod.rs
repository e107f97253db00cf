//! Stage attestation signing
//!
//! Each pipeline stage stamps a non-repudiation signature binding the
//! order id, amount and timestamp of its action. Key custody is out of
//! scope; the signer only needs a shared secret.

use crate::error::{GateError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Trait for producing stage attestations
pub trait AttestationSigner: Send + Sync {
    fn signer_id(&self) -> &str;

    /// Sign a message; failure to sign is a stage failure, never
    /// silently ignored.
    fn sign(&self, message: &[u8]) -> Result<String>;

    fn verify(&self, message: &[u8], signature: &str) -> bool;
}

/// Canonical payload a stage signs: order id, stage name, amount and
/// timestamp, pipe-separated.
pub fn binding_payload(
    order_id: Uuid,
    stage_name: &str,
    amount: f64,
    timestamp: DateTime<Utc>,
) -> String {
    format!(
        "{}|{}|{:.6}|{}",
        order_id,
        stage_name,
        amount,
        timestamp.to_rfc3339()
    )
}

/// HMAC-SHA256 signer with a hex-encoded tag
pub struct HmacSigner {
    signer_id: String,
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(signer_id: impl Into<String>, key: impl AsRef<[u8]>) -> Self {
        Self {
            signer_id: signer_id.into(),
            key: key.as_ref().to_vec(),
        }
    }

    /// Key from `GATE_ATTESTATION_KEY`, falling back to a development
    /// key so the demo binary runs unconfigured.
    pub fn from_env(signer_id: impl Into<String>) -> Self {
        let key = std::env::var("GATE_ATTESTATION_KEY")
            .unwrap_or_else(|_| "dev-attestation-key".to_string());
        Self::new(signer_id, key.as_bytes())
    }
}

impl AttestationSigner for HmacSigner {
    fn signer_id(&self) -> &str {
        &self.signer_id
    }

    fn sign(&self, message: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| GateError::Attestation(format!("invalid signing key: {}", e)))?;
        mac.update(message);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, message: &[u8], signature: &str) -> bool {
        let Ok(raw) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return false;
        };
        mac.update(message);
        mac.verify_slice(&raw).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_round_trip() {
        let signer = HmacSigner::new("approval-agent", b"test-key");
        let payload = binding_payload(Uuid::new_v4(), "approval", 0.05, Utc::now());

        let signature = signer.sign(payload.as_bytes()).unwrap();
        assert!(signer.verify(payload.as_bytes(), &signature));
    }

    #[test]
    fn test_tampered_message_fails_verification() {
        let signer = HmacSigner::new("approval-agent", b"test-key");
        let signature = signer.sign(b"amount=0.05").unwrap();

        assert!(!signer.verify(b"amount=5.00", &signature));
        assert!(!signer.verify(b"amount=0.05", "not-hex"));
    }

    #[test]
    fn test_different_keys_produce_different_tags() {
        let a = HmacSigner::new("a", b"key-a");
        let b = HmacSigner::new("b", b"key-b");

        let sig_a = a.sign(b"message").unwrap();
        let sig_b = b.sign(b"message").unwrap();
        assert_ne!(sig_a, sig_b);
        assert!(!b.verify(b"message", &sig_a));
    }
}
