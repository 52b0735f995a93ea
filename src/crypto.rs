use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Nonce,
};

/// Encrypts OAuth tokens before they hit `connections.access_token` /
/// `refresh_token`. The nonce is generated per-call and stored alongside the
/// ciphertext (`nonce || ciphertext`, base64), since AES-GCM nonces must never
/// repeat under the same key but don't need to be secret.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .expect("AES-GCM encryption is infallible for in-memory buffers");
        let mut combined = Vec::with_capacity(nonce.len() + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(combined)
    }

    pub fn decrypt(&self, encoded: &str) -> anyhow::Result<String> {
        use base64::Engine;
        let combined = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        if combined.len() < 12 {
            anyhow::bail!("ciphertext too short to contain a nonce");
        }
        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| anyhow::anyhow!("token decryption failed (wrong key or corrupt data)"))?;
        Ok(String::from_utf8(plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_token() {
        let cipher = TokenCipher::new(&[7u8; 32]);
        let encrypted = cipher.encrypt("ya29.refresh-token-value");
        assert_ne!(encrypted, "ya29.refresh-token-value");
        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, "ya29.refresh-token-value");
    }

    #[test]
    fn distinct_ciphertexts_for_same_plaintext() {
        let cipher = TokenCipher::new(&[9u8; 32]);
        let a = cipher.encrypt("same-token");
        let b = cipher.encrypt("same-token");
        assert_ne!(a, b, "nonce must differ per encryption");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher_a = TokenCipher::new(&[1u8; 32]);
        let cipher_b = TokenCipher::new(&[2u8; 32]);
        let encrypted = cipher_a.encrypt("secret");
        assert!(cipher_b.decrypt(&encrypted).is_err());
    }
}
