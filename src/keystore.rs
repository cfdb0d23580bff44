//! Encrypted Deposit Secret Storage
//!
//! Per-address secrets are encrypted at rest using AES-256-GCM with a key
//! derived from the configured passphrase via Argon2id over a per-record
//! random salt, so a leaked database alone is not an immediate compromise.
//!
//! Decryption fails closed: a wrong passphrase or a corrupted envelope is an
//! explicit error, never a wrong-but-plausible secret. Running without a
//! passphrase stores secrets in plaintext envelopes; that mode can only be
//! chosen through configuration and is announced loudly at startup.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keystore errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption failed")]
    Decryption,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("envelope mode mismatch: {0}")]
    ModeMismatch(String),
}

/// Envelope format version
const ENVELOPE_VERSION: u8 = 1;

const KDF_ARGON2ID: &str = "argon2id";
const KDF_NONE: &str = "none";

/// Encrypted envelope persisted alongside each deposit address
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    /// Version for future format changes
    version: u8,
    /// Key derivation function: "argon2id" or "none"
    kdf: String,
    /// Salt for key derivation (hex-encoded)
    salt: String,
    /// Nonce for AES-GCM (hex-encoded)
    nonce: String,
    /// Ciphertext, or the raw secret when kdf is "none" (hex-encoded)
    ciphertext: String,
}

enum Mode {
    Encrypted { passphrase: String },
    Plaintext,
}

/// Encrypts and decrypts deposit address secrets
pub struct KeyStore {
    mode: Mode,
}

impl KeyStore {
    /// Create a keystore. `None` selects plaintext storage; the caller is
    /// responsible for announcing that degradation at startup.
    pub fn new(passphrase: Option<String>) -> Self {
        let mode = match passphrase {
            Some(passphrase) => Mode::Encrypted { passphrase },
            None => Mode::Plaintext,
        };
        Self { mode }
    }

    /// Whether secrets are encrypted at rest
    pub fn is_encrypted(&self) -> bool {
        matches!(self.mode, Mode::Encrypted { .. })
    }

    /// Encrypt a secret into an envelope string
    pub fn encrypt(&self, secret: &[u8]) -> Result<String, KeystoreError> {
        let envelope = match &self.mode {
            Mode::Plaintext => Envelope {
                version: ENVELOPE_VERSION,
                kdf: KDF_NONE.to_string(),
                salt: String::new(),
                nonce: String::new(),
                ciphertext: hex::encode(secret),
            },
            Mode::Encrypted { passphrase } => {
                let mut salt = [0u8; 16];
                let mut nonce_bytes = [0u8; 12];
                rand::thread_rng().fill_bytes(&mut salt);
                rand::thread_rng().fill_bytes(&mut nonce_bytes);

                let key = derive_key(passphrase, &salt)?;
                let cipher = Aes256Gcm::new_from_slice(&key)
                    .map_err(|e| KeystoreError::Encryption(e.to_string()))?;
                let nonce = Nonce::from_slice(&nonce_bytes);

                let ciphertext = cipher
                    .encrypt(nonce, secret)
                    .map_err(|e| KeystoreError::Encryption(e.to_string()))?;

                Envelope {
                    version: ENVELOPE_VERSION,
                    kdf: KDF_ARGON2ID.to_string(),
                    salt: hex::encode(salt),
                    nonce: hex::encode(nonce_bytes),
                    ciphertext: hex::encode(ciphertext),
                }
            }
        };

        serde_json::to_string(&envelope).map_err(|e| KeystoreError::Encryption(e.to_string()))
    }

    /// Decrypt an envelope string back into the secret
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>, KeystoreError> {
        let envelope: Envelope = serde_json::from_str(envelope)
            .map_err(|e| KeystoreError::MalformedEnvelope(e.to_string()))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(KeystoreError::MalformedEnvelope(format!(
                "unsupported version: {}",
                envelope.version
            )));
        }

        match (&self.mode, envelope.kdf.as_str()) {
            (Mode::Plaintext, KDF_NONE) => hex::decode(&envelope.ciphertext)
                .map_err(|e| KeystoreError::MalformedEnvelope(e.to_string())),
            (Mode::Encrypted { passphrase }, KDF_ARGON2ID) => {
                let salt = hex::decode(&envelope.salt)
                    .map_err(|e| KeystoreError::MalformedEnvelope(e.to_string()))?;
                let nonce_bytes = hex::decode(&envelope.nonce)
                    .map_err(|e| KeystoreError::MalformedEnvelope(e.to_string()))?;
                let ciphertext = hex::decode(&envelope.ciphertext)
                    .map_err(|e| KeystoreError::MalformedEnvelope(e.to_string()))?;

                if nonce_bytes.len() != 12 {
                    return Err(KeystoreError::MalformedEnvelope(format!(
                        "bad nonce length: {}",
                        nonce_bytes.len()
                    )));
                }

                let key = derive_key(passphrase, &salt)?;
                let cipher = Aes256Gcm::new_from_slice(&key)
                    .map_err(|_| KeystoreError::Decryption)?;
                let nonce = Nonce::from_slice(&nonce_bytes);

                cipher
                    .decrypt(nonce, ciphertext.as_ref())
                    .map_err(|_| KeystoreError::Decryption)
            }
            // A passphrase-mode store must not quietly accept plaintext
            // envelopes, and plaintext mode cannot read encrypted ones.
            (_, kdf) => Err(KeystoreError::ModeMismatch(kdf.to_string())),
        }
    }
}

/// Derive a 256-bit AES key from the passphrase and salt via Argon2id
fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; 32], KeystoreError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| KeystoreError::Encryption(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSPHRASE: &str = "correct horse battery staple";

    #[test]
    fn test_round_trip() {
        let store = KeyStore::new(Some(PASSPHRASE.to_string()));
        let secret = [7u8; 64];

        let envelope = store.encrypt(&secret).unwrap();
        assert!(!envelope.contains(&hex::encode(secret)));

        let decrypted = store.decrypt(&envelope).unwrap();
        assert_eq!(decrypted, secret);
    }

    #[test]
    fn test_wrong_passphrase_fails_closed() {
        let store = KeyStore::new(Some(PASSPHRASE.to_string()));
        let envelope = store.encrypt(&[1u8; 64]).unwrap();

        let wrong = KeyStore::new(Some("a completely different phrase".to_string()));
        assert!(matches!(
            wrong.decrypt(&envelope),
            Err(KeystoreError::Decryption)
        ));
    }

    #[test]
    fn test_corrupted_envelope_fails_closed() {
        let store = KeyStore::new(Some(PASSPHRASE.to_string()));
        let envelope = store.encrypt(&[2u8; 64]).unwrap();

        // Flip the first byte of the ciphertext
        let mut parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        let ct = parsed["ciphertext"].as_str().unwrap().to_string();
        let replacement = if ct.starts_with("00") { "11" } else { "00" };
        let corrupted = format!("{}{}", replacement, &ct[2..]);
        parsed["ciphertext"] = serde_json::Value::String(corrupted);
        let tampered = parsed.to_string();

        let result = store.decrypt(&tampered);
        assert!(result.is_err());
    }

    #[test]
    fn test_plaintext_mode_round_trip() {
        let store = KeyStore::new(None);
        assert!(!store.is_encrypted());

        let envelope = store.encrypt(&[3u8; 64]).unwrap();
        assert_eq!(store.decrypt(&envelope).unwrap(), [3u8; 64]);
    }

    #[test]
    fn test_mode_mismatch_rejected() {
        let plain = KeyStore::new(None);
        let encrypted = KeyStore::new(Some(PASSPHRASE.to_string()));

        let plain_envelope = plain.encrypt(&[4u8; 64]).unwrap();
        assert!(matches!(
            encrypted.decrypt(&plain_envelope),
            Err(KeystoreError::ModeMismatch(_))
        ));

        let enc_envelope = encrypted.encrypt(&[5u8; 64]).unwrap();
        assert!(matches!(
            plain.decrypt(&enc_envelope),
            Err(KeystoreError::ModeMismatch(_))
        ));
    }

    #[test]
    fn test_garbage_envelope_is_malformed() {
        let store = KeyStore::new(Some(PASSPHRASE.to_string()));
        assert!(matches!(
            store.decrypt("not json at all"),
            Err(KeystoreError::MalformedEnvelope(_))
        ));
    }
}
