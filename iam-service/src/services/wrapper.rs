//! At-rest secret wrapping.
//!
//! The repository never handles raw key material: it seals and opens opaque
//! blobs through a [`SecretWrapper`]. [`AeadWrapper`] is the local
//! ChaCha20-Poly1305 implementation; a KMS-backed wrapper plugs in behind the
//! same trait.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::services::error::IamError;

const NONCE_LEN: usize = 12;

/// Ciphertext plus what is needed to open it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedSecret {
    pub key_id: String,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl WrappedSecret {
    /// `{key_id}:{base64 nonce}:{base64 ciphertext}`
    pub fn to_encoded(&self) -> String {
        format!(
            "{}:{}:{}",
            self.key_id,
            STANDARD.encode(&self.nonce),
            STANDARD.encode(&self.ciphertext)
        )
    }

    pub fn from_encoded(encoded: &str) -> Result<Self, IamError> {
        let mut parts = encoded.rsplitn(3, ':');
        let (Some(ciphertext), Some(nonce), Some(key_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(IamError::invalid("error malformed wrapped secret"));
        };
        let decode = |part: &str| {
            STANDARD
                .decode(part)
                .map_err(|e| IamError::invalid(format!("error malformed wrapped secret: {}", e)))
        };
        Ok(Self {
            key_id: key_id.to_string(),
            nonce: decode(nonce)?,
            ciphertext: decode(ciphertext)?,
        })
    }
}

#[async_trait]
pub trait SecretWrapper: Send + Sync {
    /// Identifier of the key new secrets are sealed with.
    fn key_id(&self) -> &str;

    async fn encrypt(&self, plaintext: &[u8]) -> Result<WrappedSecret, IamError>;

    async fn decrypt(&self, wrapped: &WrappedSecret) -> Result<Vec<u8>, IamError>;
}

/// ChaCha20-Poly1305 wrapper over a single local key.
pub struct AeadWrapper {
    key_id: String,
    key: Secret<[u8; 32]>,
}

impl AeadWrapper {
    pub fn new(key_id: impl Into<String>, key: [u8; 32]) -> Self {
        Self {
            key_id: key_id.into(),
            key: Secret::new(key),
        }
    }

    /// Wrapper over a freshly generated random key.
    pub fn generate(key_id: impl Into<String>) -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key_id, key)
    }

    /// Wrapper over a base64 encoded 32 byte key.
    pub fn from_encoded_key(key_id: impl Into<String>, encoded: &str) -> Result<Self, IamError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| IamError::Wrapping(anyhow::anyhow!("Invalid wrapper key: {}", e)))?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            IamError::Wrapping(anyhow::anyhow!(
                "Wrapper key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(key_id, key))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.key.expose_secret()))
    }
}

#[async_trait]
impl SecretWrapper for AeadWrapper {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<WrappedSecret, IamError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher().encrypt(&nonce, plaintext).map_err(|e| {
            tracing::error!(key_id = %self.key_id, "Secret encryption failed");
            IamError::Wrapping(anyhow::anyhow!("Encryption failed: {}", e))
        })?;
        Ok(WrappedSecret {
            key_id: self.key_id.clone(),
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    async fn decrypt(&self, wrapped: &WrappedSecret) -> Result<Vec<u8>, IamError> {
        if wrapped.key_id != self.key_id {
            return Err(IamError::Wrapping(anyhow::anyhow!(
                "Secret sealed with key {}, wrapper holds {}",
                wrapped.key_id,
                self.key_id
            )));
        }
        if wrapped.nonce.len() != NONCE_LEN {
            return Err(IamError::Wrapping(anyhow::anyhow!(
                "Invalid nonce length {}",
                wrapped.nonce.len()
            )));
        }
        self.cipher()
            .decrypt(Nonce::from_slice(&wrapped.nonce), wrapped.ciphertext.as_slice())
            .map_err(|e| {
                tracing::warn!(key_id = %self.key_id, "Secret decryption failed");
                IamError::Wrapping(anyhow::anyhow!("Decryption failed: {}", e))
            })
    }
}
