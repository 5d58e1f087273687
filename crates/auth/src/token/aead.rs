use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chacha20poly1305::aead::{Aead, KeyInit, Payload as Sealed};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::{Payload, SecretKey, TokenEngine, TokenError, TokenScheme, check_fresh, check_issuable};

/// Version header; also bound as associated data.
const HEADER: &str = "aead.v1.";
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Symmetric authenticated-encryption backend.
///
/// Token layout: `aead.v1.` + base64url(nonce || ciphertext). The payload is
/// confidential as well as tamper-evident.
#[derive(Debug, Clone, Default)]
pub struct AeadEngine;

impl AeadEngine {
    pub fn new() -> Self {
        Self
    }

    fn cipher(key: &SecretKey) -> XChaCha20Poly1305 {
        let digest = Sha256::digest(key.expose());
        XChaCha20Poly1305::new(Key::from_slice(digest.as_slice()))
    }
}

impl TokenEngine for AeadEngine {
    fn scheme(&self) -> TokenScheme {
        TokenScheme::Aead
    }

    fn create_token(&self, key: &SecretKey, payload: &Payload) -> Result<String, TokenError> {
        check_issuable(key, payload)?;

        let plaintext = serde_json::to_vec(payload).map_err(|e| TokenError::server(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = Self::cipher(key)
            .encrypt(
                XNonce::from_slice(&nonce_bytes),
                Sealed {
                    msg: &plaintext,
                    aad: HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::server("encryption failed"))?;

        let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        body.extend_from_slice(&nonce_bytes);
        body.extend_from_slice(&ciphertext);

        Ok(format!("{HEADER}{}", URL_SAFE_NO_PAD.encode(body)))
    }

    fn verify_token(&self, key: &SecretKey, token: &str) -> Result<Payload, TokenError> {
        key.ensure_min_len()?;

        let encoded = token
            .strip_prefix(HEADER)
            .ok_or_else(|| TokenError::malformed("unknown token header"))?;
        let body = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::malformed("invalid base64 body"))?;
        if body.len() < NONCE_LEN + TAG_LEN {
            return Err(TokenError::malformed("token body truncated"));
        }

        let (nonce, ciphertext) = body.split_at(NONCE_LEN);
        let plaintext = Self::cipher(key)
            .decrypt(
                XNonce::from_slice(nonce),
                Sealed {
                    msg: ciphertext,
                    aad: HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::SignatureInvalid)?;

        let payload: Payload = serde_json::from_slice(&plaintext)
            .map_err(|e| TokenError::FailedParseClaims(e.to_string()))?;

        check_fresh(payload, Utc::now())
    }
}
