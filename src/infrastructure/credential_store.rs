//! Credential blob encryption at rest (§4.2, §6): a `(access_key, secret_key)`
//! pair is encrypted under a password-derived key into a portable JSON blob.
//!
//! Key derivation: PBKDF2-HMAC-SHA256, 100 000 iterations, fixed salt.
//! Cipher: AES-256-GCM with a fresh random 96-bit nonce per field.

use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::domain::errors::CredentialError;

const PBKDF2_ITERATIONS: u32 = 100_000;
/// Fixed per-deployment salt. Not a secret — PBKDF2's defense here is the
/// iteration count, not salt secrecy; the password is what must stay secret.
const FIXED_SALT: &[u8] = b"upbit-trading-bot-credential-store-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialBlob {
    pub encrypted_access_key: String,
    pub encrypted_secret_key: String,
}

fn derive_key(password: &str) -> Key<Aes256Gcm> {
    let mut key_bytes = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), FIXED_SALT, PBKDF2_ITERATIONS, &mut key_bytes);
    key_bytes.into()
}

fn encrypt_field(cipher: &Aes256Gcm, plaintext: &[u8]) -> Result<String, CredentialError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CredentialError::DecryptError)?;

    let mut combined = Vec::with_capacity(nonce.len() + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

fn decrypt_field(cipher: &Aes256Gcm, blob_b64: &str) -> Result<Zeroizing<String>, CredentialError> {
    let combined = STANDARD
        .decode(blob_b64)
        .map_err(|e| CredentialError::MalformedBlob(e.to_string()))?;
    if combined.len() < 12 {
        return Err(CredentialError::MalformedBlob(
            "blob shorter than one nonce".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let plaintext = cipher
        .decrypt(nonce_bytes.into(), ciphertext)
        .map_err(|_| CredentialError::DecryptError)?;
    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| CredentialError::DecryptError)
}

/// Encrypts a credential pair under `password`. Non-deterministic — each call
/// draws a fresh nonce per field, so successive calls never produce the same blob.
pub fn encrypt(
    password: &str,
    access_key: &str,
    secret_key: &str,
) -> Result<CredentialBlob, CredentialError> {
    let key = derive_key(password);
    let cipher = Aes256Gcm::new(&key);

    Ok(CredentialBlob {
        encrypted_access_key: encrypt_field(&cipher, access_key.as_bytes())?,
        encrypted_secret_key: encrypt_field(&cipher, secret_key.as_bytes())?,
    })
}

/// Decrypts a blob under `password`. A wrong password fails with `DecryptError`
/// rather than returning garbage, because AES-GCM is an authenticated cipher.
pub fn decrypt(
    password: &str,
    blob: &CredentialBlob,
) -> Result<(Zeroizing<String>, Zeroizing<String>), CredentialError> {
    let key = derive_key(password);
    let cipher = Aes256Gcm::new(&key);

    let access_key = decrypt_field(&cipher, &blob.encrypted_access_key)?;
    let secret_key = decrypt_field(&cipher, &blob.encrypted_secret_key)?;
    Ok((access_key, secret_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_under_the_correct_password() {
        let blob = encrypt("correct horse battery staple", "access-123", "secret-456").unwrap();
        let (access, secret) = decrypt("correct horse battery staple", &blob).unwrap();
        assert_eq!(*access, "access-123");
        assert_eq!(*secret, "secret-456");
    }

    #[test]
    fn wrong_password_fails_to_decrypt() {
        let blob = encrypt("correct horse battery staple", "access-123", "secret-456").unwrap();
        let result = decrypt("wrong password", &blob);
        assert!(matches!(result, Err(CredentialError::DecryptError)));
    }

    #[test]
    fn encryption_is_non_deterministic() {
        let blob1 = encrypt("password", "access", "secret").unwrap();
        let blob2 = encrypt("password", "access", "secret").unwrap();
        assert_ne!(blob1.encrypted_access_key, blob2.encrypted_access_key);
    }

    #[test]
    fn malformed_blob_is_rejected_cleanly() {
        let blob = CredentialBlob {
            encrypted_access_key: "not-valid-base64!!".to_string(),
            encrypted_secret_key: "also-not-valid".to_string(),
        };
        assert!(matches!(
            decrypt("password", &blob),
            Err(CredentialError::MalformedBlob(_))
        ));
    }

    #[test]
    fn round_trips_arbitrary_byte_sequences_via_utf8_keys() {
        let odd_key = "ключ-🔑-key-with-unicode";
        let blob = encrypt("pw", odd_key, odd_key).unwrap();
        let (access, secret) = decrypt("pw", &blob).unwrap();
        assert_eq!(*access, odd_key);
        assert_eq!(*secret, odd_key);
    }
}
