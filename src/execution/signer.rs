//! Wallet signing capability
//!
//! Produces authentication headers for an outbound order payload. Two
//! interchangeable implementations: a remote signing service and a local
//! key held in config/environment.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-WALLET-SIGNATURE";
pub const PUBLIC_KEY_HEADER: &str = "X-WALLET-PUBLIC-KEY";

/// Signing failures
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("signer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("signer responded with status {0}")]
    Status(u16),
    #[error("signer response missing signature/public_key")]
    MissingFields,
    #[error("could not decode private key material")]
    InvalidKey,
}

/// Headers to attach to a signed request
#[derive(Debug, Clone, Default)]
pub struct SignedHeaders {
    pub headers: HashMap<String, String>,
}

/// Capability that signs an order payload into auth headers
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign(&self, payload: &serde_json::Value) -> Result<SignedHeaders, SignerError>;
}

/// Delegates signing to a remote service.
///
/// POSTs `{"payload": ...}` and expects `signature` and `public_key` in the
/// response, plus an optional `headers` map merged in verbatim.
pub struct RemoteSigner {
    signer_url: String,
    http: reqwest::Client,
}

impl RemoteSigner {
    pub fn new(signer_url: impl Into<String>) -> Self {
        Self {
            signer_url: signer_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct RemoteSignResponse {
    signature: Option<String>,
    public_key: Option<String>,
    headers: Option<HashMap<String, String>>,
}

#[async_trait]
impl WalletSigner for RemoteSigner {
    async fn sign(&self, payload: &serde_json::Value) -> Result<SignedHeaders, SignerError> {
        let response = self
            .http
            .post(&self.signer_url)
            .json(&serde_json::json!({ "payload": payload }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SignerError::Status(response.status().as_u16()));
        }

        let body: RemoteSignResponse = response.json().await?;
        let (signature, public_key) = match (body.signature, body.public_key) {
            (Some(s), Some(p)) if !s.is_empty() && !p.is_empty() => (s, p),
            _ => return Err(SignerError::MissingFields),
        };

        let mut headers = HashMap::new();
        headers.insert(SIGNATURE_HEADER.to_string(), signature);
        headers.insert(PUBLIC_KEY_HEADER.to_string(), public_key);
        if let Some(extra) = body.headers {
            headers.extend(extra);
        }
        Ok(SignedHeaders { headers })
    }
}

/// Signs locally with an HMAC-SHA256 over the canonical JSON payload.
///
/// serde_json serializes object keys in sorted order, which gives a stable
/// byte representation for the same logical payload.
pub struct LocalKeySigner {
    key: Vec<u8>,
    public_key: String,
}

impl LocalKeySigner {
    /// Build from key material; accepts 0x-prefixed hex, base64, or bare hex
    pub fn new(private_key: &str, public_key: Option<String>) -> Result<Self, SignerError> {
        let key = decode_key(private_key)?;
        let public_key = public_key.unwrap_or_else(|| hex::encode(Sha256::digest(&key)));
        Ok(Self { key, public_key })
    }

    fn signature(&self, payload: &serde_json::Value) -> Result<String, SignerError> {
        let message = serde_json::to_vec(payload).map_err(|_| SignerError::MissingFields)?;
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| SignerError::InvalidKey)?;
        mac.update(&message);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl WalletSigner for LocalKeySigner {
    async fn sign(&self, payload: &serde_json::Value) -> Result<SignedHeaders, SignerError> {
        let mut headers = HashMap::new();
        headers.insert(SIGNATURE_HEADER.to_string(), self.signature(payload)?);
        headers.insert(PUBLIC_KEY_HEADER.to_string(), self.public_key.clone());
        Ok(SignedHeaders { headers })
    }
}

fn decode_key(value: &str) -> Result<Vec<u8>, SignerError> {
    let sanitized = value.trim();
    if let Some(hex_part) = sanitized.strip_prefix("0x") {
        return hex::decode(hex_part).map_err(|_| SignerError::InvalidKey);
    }
    if let Ok(bytes) = BASE64.decode(sanitized) {
        return Ok(bytes);
    }
    hex::decode(sanitized).map_err(|_| SignerError::InvalidKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_key_hex_prefixed() {
        assert_eq!(decode_key("0xdeadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_decode_key_base64() {
        let encoded = BASE64.encode(b"secret-key");
        assert_eq!(decode_key(&encoded).unwrap(), b"secret-key".to_vec());
    }

    #[test]
    fn test_decode_key_invalid() {
        assert!(decode_key("0xnothex!!").is_err());
    }

    #[tokio::test]
    async fn test_local_signer_headers() {
        let signer = LocalKeySigner::new("0xdeadbeef", Some("pub".to_string())).unwrap();
        let headers = signer.sign(&json!({"market": "m", "size": 10})).await.unwrap();

        assert_eq!(headers.headers[PUBLIC_KEY_HEADER], "pub");
        assert!(!headers.headers[SIGNATURE_HEADER].is_empty());
    }

    #[tokio::test]
    async fn test_local_signer_is_deterministic() {
        let signer = LocalKeySigner::new("0xdeadbeef", None).unwrap();
        let payload = json!({"b": 2, "a": 1});
        let first = signer.sign(&payload).await.unwrap();
        let second = signer.sign(&payload).await.unwrap();
        assert_eq!(
            first.headers[SIGNATURE_HEADER],
            second.headers[SIGNATURE_HEADER]
        );
    }

    #[tokio::test]
    async fn test_different_payloads_sign_differently() {
        let signer = LocalKeySigner::new("0xdeadbeef", None).unwrap();
        let first = signer.sign(&json!({"a": 1})).await.unwrap();
        let second = signer.sign(&json!({"a": 2})).await.unwrap();
        assert_ne!(
            first.headers[SIGNATURE_HEADER],
            second.headers[SIGNATURE_HEADER]
        );
    }
}
