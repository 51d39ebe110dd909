//! Per-user AES-256-GCM encryption for chat records at rest.
//!
//! `RecordCipher` derives one AES-256 key per user with PBKDF2-HMAC-SHA256
//! over `user_id + salt`, so a device shared by several patients never lets
//! one account's records decrypt under another's key. Derivation is
//! deterministic: no key material is persisted, and re-deriving after a
//! restart yields the same key. Derived keys are memoized in a `DashMap`.
//!
//! Encrypted records travel as `base64(nonce (12 bytes) || ciphertext)`,
//! ready to store in a TEXT column.
//!
//! SECURITY: Error types never contain plaintext or key material.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use carelog_types::error::CipherError;
use dashmap::DashMap;
use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

/// Nonce size for AES-256-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// PBKDF2 iteration count for key derivation.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Placeholder returned in place of records that fail to decrypt.
///
/// A corrupt or foreign-key row renders as this literal instead of failing
/// the whole listing, so one bad record never takes down a session view.
pub const DECRYPTION_SENTINEL: &str = "[DECRYPTION_ERROR]";

/// Per-user AES-256-GCM cipher for chat titles and message content.
///
/// Each encryption call generates a random 12-byte nonce, prepended to the
/// ciphertext before base64 encoding. Encrypting the same plaintext twice
/// therefore produces different output.
pub struct RecordCipher {
    salt: SecretString,
    keys: DashMap<String, [u8; 32]>,
}

impl RecordCipher {
    /// Create a new cipher with the given key-derivation salt.
    ///
    /// The salt is an application-level constant, not a per-record value;
    /// the entropy separating users comes from the `user_id` folded into
    /// the PBKDF2 password. It is wrapped in [`SecretString`] so it never
    /// shows up in Debug output or logs.
    pub fn new(salt: SecretString) -> Self {
        Self {
            salt,
            keys: DashMap::new(),
        }
    }

    /// Encrypt plaintext under the given user's derived key.
    ///
    /// Returns `base64(nonce || ciphertext)`. Empty plaintext is returned
    /// as-is: blank titles stay blank rather than becoming opaque blobs.
    pub fn encrypt(&self, user_id: &str, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher_for(user_id)
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64_STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Expects `base64(nonce (12 bytes) || ciphertext)`. Empty input is
    /// returned as-is, mirroring the encrypt-side bypass.
    pub fn decrypt(&self, user_id: &str, blob: &str) -> Result<String, CipherError> {
        if blob.is_empty() {
            return Ok(String::new());
        }

        let data = BASE64_STANDARD
            .decode(blob)
            .map_err(|_| CipherError::InvalidEncoding)?;
        if data.len() < NONCE_SIZE {
            return Err(CipherError::CiphertextTooShort);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher_for(user_id)
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }

    /// Decrypt a blob, substituting [`DECRYPTION_SENTINEL`] on any failure.
    ///
    /// This is the read path used by the store: a record encrypted under a
    /// different user's key, or corrupted on disk, renders as the sentinel
    /// instead of aborting the query that found it.
    pub fn decrypt_or_sentinel(&self, user_id: &str, blob: &str) -> String {
        match self.decrypt(user_id, blob) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "Failed to decrypt stored record");
                DECRYPTION_SENTINEL.to_string()
            }
        }
    }

    fn cipher_for(&self, user_id: &str) -> Aes256Gcm {
        let key = *self
            .keys
            .entry(user_id.to_string())
            .or_insert_with(|| self.derive_key(user_id));
        Aes256Gcm::new((&key).into())
    }

    /// Derive the user's 32-byte key: PBKDF2-HMAC-SHA256 over
    /// `user_id + salt`, with the salt doubling as the PBKDF2 salt.
    fn derive_key(&self, user_id: &str) -> [u8; 32] {
        let salt = self.salt.expose_secret();
        let password = format!("{user_id}{salt}");
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            salt.as_bytes(),
            PBKDF2_ITERATIONS,
            &mut key,
        );
        key
    }
}
