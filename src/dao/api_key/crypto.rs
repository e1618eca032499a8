use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("base64 decode failed: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("invalid encrypted data: too short")]
    TooShort,
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("decrypted secret is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("decrypted secret does not match its stored hash")]
    IntegrityMismatch,
}

/// AES-256-GCM cipher for API secrets at rest.
///
/// Ciphertext layout: base64(nonce || ciphertext).
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretCipher { .. }")
    }
}

impl SecretCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Accepts a base64-encoded 32-byte key; anything else is treated as a
    /// passphrase and stretched with SHA-256.
    pub fn from_config_key(raw: &str) -> Self {
        if let Ok(bytes) = general_purpose::STANDARD.decode(raw.trim()) {
            if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
                return Self::new(&key);
            }
        }
        let digest = Sha256::digest(raw.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut encrypted = nonce_bytes.to_vec();
        encrypted.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(&encrypted))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let encrypted = general_purpose::STANDARD.decode(encoded)?;
        if encrypted.len() < NONCE_LEN {
            return Err(CryptoError::TooShort);
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Hash and encrypt a raw secret: `(key_hash, encrypted_key_value)`.
    pub fn seal(&self, secret: &str) -> Result<(String, String), CryptoError> {
        Ok((generate_key_hash(secret), self.encrypt(secret)?))
    }

    /// Decrypt and check the plaintext against the stored hash.
    pub fn open(&self, encrypted: &str, stored_hash: &str) -> Result<String, CryptoError> {
        let secret = self.decrypt(encrypted)?;
        if !verify_key_integrity(&secret, stored_hash) {
            return Err(CryptoError::IntegrityMismatch);
        }
        Ok(secret)
    }
}

/// SHA-256 of the raw secret as lowercase hex
pub fn generate_key_hash(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

pub fn verify_key_integrity(secret: &str, stored_hash: &str) -> bool {
    generate_key_hash(secret) == stored_hash
}

/// Display form of a secret, e.g. `ghp_...wxyz`. Short secrets are fully masked.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
