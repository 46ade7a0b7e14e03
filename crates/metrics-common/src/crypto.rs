// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! RSA-OAEP (SHA-256) payload envelope.
//!
//! Payloads longer than one OAEP block are split into chunks of `k - 2*32 - 2` bytes, where `k`
//! is the modulus size in bytes, and each chunk is encrypted independently. The ciphertext is the
//! concatenation of the resulting `k`-byte blocks. Both sides are optional: without a key the
//! payload passes through unchanged.

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;

use crate::errors::CodecError;

/// OAEP overhead in bytes for a SHA-256 digest.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

fn read_pem(path: &Path) -> Result<String, CodecError> {
    std::fs::read_to_string(path).map_err(|source| CodecError::KeyFile {
        path: path.display().to_string(),
        source,
    })
}

/// Agent-side half: encrypts with the collector's public key.
#[derive(Debug, Clone, Default)]
pub struct Encryptor {
    key: Option<RsaPublicKey>,
}

impl Encryptor {
    pub fn new(key: Option<RsaPublicKey>) -> Self {
        Encryptor { key }
    }

    /// Loads a PEM public key (SubjectPublicKeyInfo, or PKCS#1 as a fallback).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let pem = read_pem(path.as_ref())?;
        let key = RsaPublicKey::from_public_key_pem(&pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(&pem))
            .map_err(|e| CodecError::KeyParse(e.to_string()))?;
        debug!("Loaded RSA public key from {}", path.as_ref().display());
        Ok(Encryptor::new(Some(key)))
    }

    /// Builds an encryptor from an optional key path. `None` disables encryption.
    pub fn from_optional_file(path: Option<&str>) -> Result<Self, CodecError> {
        match path {
            Some(path) => Encryptor::from_file(path),
            None => Ok(Encryptor::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let Some(key) = &self.key else {
            return Ok(data.to_vec());
        };

        let block_size = key.size();
        let chunk_size = block_size.saturating_sub(OAEP_SHA256_OVERHEAD).max(1);
        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(data.len().div_ceil(chunk_size).max(1) * block_size);

        if data.is_empty() {
            let block = key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), data)
                .map_err(CodecError::Encryption)?;
            out.extend_from_slice(&block);
            return Ok(out);
        }

        for chunk in data.chunks(chunk_size) {
            let block = key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
                .map_err(CodecError::Encryption)?;
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

/// Collector-side half: decrypts with the private key.
#[derive(Debug, Clone, Default)]
pub struct Decryptor {
    key: Option<RsaPrivateKey>,
}

impl Decryptor {
    pub fn new(key: Option<RsaPrivateKey>) -> Self {
        Decryptor { key }
    }

    /// Loads a PEM private key (PKCS#1, or PKCS#8 as a fallback).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let pem = read_pem(path.as_ref())?;
        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
            .map_err(|e| CodecError::KeyParse(e.to_string()))?;
        debug!("Loaded RSA private key from {}", path.as_ref().display());
        Ok(Decryptor::new(Some(key)))
    }

    pub fn from_optional_file(path: Option<&str>) -> Result<Self, CodecError> {
        match path {
            Some(path) => Decryptor::from_file(path),
            None => Ok(Decryptor::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let Some(key) = &self.key else {
            return Ok(data.to_vec());
        };

        let block_size = key.size();
        if data.is_empty() || data.len() % block_size != 0 {
            return Err(CodecError::Decryption(format!(
                "ciphertext length {} is not a multiple of the {block_size}-byte block size",
                data.len()
            )));
        }

        let mut out = Vec::with_capacity(data.len());
        for block in data.chunks(block_size) {
            let plain = key
                .decrypt(Oaep::new::<Sha256>(), block)
                .map_err(|e| CodecError::Decryption(e.to_string()))?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};

    fn key_pair() -> (Encryptor, Decryptor) {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public = RsaPublicKey::from(&private);
        (Encryptor::new(Some(public)), Decryptor::new(Some(private)))
    }

    #[test]
    fn test_disabled_is_passthrough() {
        let payload = br#"[{"id":"a","type":"gauge","value":1}]"#;
        assert_eq!(Encryptor::default().encrypt(payload).unwrap(), payload);
        assert_eq!(Decryptor::default().decrypt(payload).unwrap(), payload);
        assert!(!Encryptor::default().is_enabled());
    }

    #[test]
    fn test_payload_larger_than_one_block() {
        let (encryptor, decryptor) = key_pair();
        // 1024-bit key: 128-byte blocks carrying at most 62 bytes each.
        let payload = "x".repeat(1000);
        let encrypted = encryptor.encrypt(payload.as_bytes()).unwrap();

        assert_eq!(encrypted.len() % 128, 0);
        assert_eq!(encrypted.len(), 1000_usize.div_ceil(62) * 128);
        assert_ne!(&encrypted[..payload.len().min(encrypted.len())], payload.as_bytes());
        assert_eq!(decryptor.decrypt(&encrypted).unwrap(), payload.as_bytes());
    }

    #[test]
    fn test_truncated_ciphertext_is_rejected() {
        let (encryptor, decryptor) = key_pair();
        let encrypted = encryptor.encrypt(b"hello").unwrap();
        let err = decryptor.decrypt(&encrypted[..encrypted.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Decryption(_)));
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let (encryptor, _) = key_pair();
        let (_, other) = key_pair();
        let encrypted = encryptor.encrypt(b"hello").unwrap();
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(CodecError::Decryption(_))
        ));
    }

    #[test]
    fn test_keys_load_from_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let private_pem = private.to_pkcs1_pem(LineEnding::LF).unwrap();

        let public_path = dir.path().join("public.pem");
        let private_path = dir.path().join("private.pem");
        std::fs::write(&public_path, public_pem.as_bytes()).unwrap();
        std::fs::write(&private_path, private_pem.as_bytes()).unwrap();

        let encryptor = Encryptor::from_file(&public_path).unwrap();
        let decryptor = Decryptor::from_file(&private_path).unwrap();
        let encrypted = encryptor.encrypt(b"metrics").unwrap();
        assert_eq!(decryptor.decrypt(&encrypted).unwrap(), b"metrics");
    }

    #[test]
    fn test_missing_key_file() {
        let err = Encryptor::from_file("/nonexistent/public.pem").unwrap_err();
        assert!(matches!(err, CodecError::KeyFile { .. }));
    }

    #[test]
    fn test_garbage_key_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not a key").unwrap();
        let err = Decryptor::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CodecError::KeyParse(_)));
    }
}
