//! Encryption at rest for persisted ledger units
//!
//! The operator supplies a secret string. A 256-bit key is derived from it
//! with PBKDF2-HMAC-SHA256 over a fixed salt, and each unit is sealed with
//! AES-256-GCM under a fresh random nonce. The unit file holds URL-safe
//! base64 of `nonce || ciphertext || tag`.

use crate::error::{LedgerError, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;

const KDF_SALT: &[u8] = b"warden_audit_ledger_salt";
const KDF_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;

/// Operator-supplied secret used to derive the ledger encryption key
///
/// Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw secret text
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Symmetric cipher for unit files
#[derive(Clone)]
pub struct LedgerCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl LedgerCipher {
    /// Derive the cipher key from an operator secret
    pub fn from_secret(secret: &EncryptionKey) -> Result<Self> {
        if secret.is_empty() {
            return Err(LedgerError::Config("encryption key is empty".to_string()));
        }

        let iterations = NonZeroU32::new(KDF_ITERATIONS)
            .ok_or_else(|| LedgerError::Crypto("invalid iteration count".to_string()))?;
        let mut derived = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            KDF_SALT,
            secret.expose().as_bytes(),
            &mut derived,
        );

        let unbound = UnboundKey::new(&AES_256_GCM, &derived)?;
        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Seal `plaintext` into the textual unit form
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes)?;

        let mut sealed = plaintext.to_vec();
        self.key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut sealed,
        )?;

        let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(framed))
    }

    /// Open a textual unit; fails on a wrong key or any modification
    pub fn decrypt(&self, text: &str) -> Result<Vec<u8>> {
        let framed = URL_SAFE
            .decode(text.trim())
            .map_err(|e| LedgerError::Crypto(format!("invalid base64: {}", e)))?;

        if framed.len() < NONCE_LEN + aead::AES_256_GCM.tag_len() {
            return Err(LedgerError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce_bytes, sealed) = framed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)?;

        let mut buffer = sealed.to_vec();
        let plaintext = self.key.open_in_place(nonce, Aad::empty(), &mut buffer)?;
        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for LedgerCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerCipher")
            .field("algorithm", &"AES-256-GCM")
            .field("key", &"<redacted>")
            .finish()
    }
}
