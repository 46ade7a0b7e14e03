// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload framing between agent and collector.
//!
//! Outbound: JSON, then RSA envelope, then HMAC-SHA256 signature over the envelope, then gzip.
//! Inbound runs the same steps in reverse: gunzip, verify, decrypt, JSON.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;

use crate::constants::HASH_SENTINEL;
use crate::crypto::{Decryptor, Encryptor};
use crate::errors::CodecError;

type HmacSha256 = Hmac<Sha256>;

pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(CodecError::Compression)?;
    encoder.finish().map_err(CodecError::Compression)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Decompression)?;
    Ok(out)
}

/// Hex-encoded HMAC-SHA256 of `data`, or `None` when no key is configured.
pub fn sign(data: &[u8], key: Option<&str>) -> Option<String> {
    let key = key.filter(|key| !key.is_empty())?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
    mac.update(data);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `signature` against `data`.
///
/// Verification is skipped when no key is configured, when the header is absent, or when it
/// carries the `none` sentinel.
pub fn verify(data: &[u8], key: Option<&str>, signature: Option<&str>) -> Result<(), CodecError> {
    let Some(key) = key.filter(|key| !key.is_empty()) else {
        return Ok(());
    };
    let signature = match signature.map(str::trim) {
        None | Some("") => return Ok(()),
        Some(s) if s == HASH_SENTINEL => return Ok(()),
        Some(s) => s,
    };

    let expected = hex::decode(signature).map_err(|_| CodecError::MalformedSignature)?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| CodecError::KeyParse(e.to_string()))?;
    mac.update(data);
    mac.verify_slice(&expected)
        .map_err(|_| CodecError::SignatureMismatch)
}

/// A framed request body and the signature header to send with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

/// Agent-side encoder.
#[derive(Debug, Clone, Default)]
pub struct PayloadEncoder {
    key: Option<String>,
    encryptor: Encryptor,
}

impl PayloadEncoder {
    pub fn new(key: Option<String>, encryptor: Encryptor) -> Self {
        PayloadEncoder {
            key: key.filter(|key| !key.is_empty()),
            encryptor,
        }
    }

    pub fn encode<T: Serialize + ?Sized>(&self, payload: &T) -> Result<EncodedPayload, CodecError> {
        let json = serde_json::to_vec(payload)?;
        let sealed = self.encryptor.encrypt(&json)?;
        let signature = sign(&sealed, self.key.as_deref());
        let body = compress(&sealed)?;
        Ok(EncodedPayload { body, signature })
    }
}

/// Collector-side decoder.
#[derive(Debug, Clone, Default)]
pub struct PayloadDecoder {
    key: Option<String>,
    decryptor: Decryptor,
}

impl PayloadDecoder {
    pub fn new(key: Option<String>, decryptor: Decryptor) -> Self {
        PayloadDecoder {
            key: key.filter(|key| !key.is_empty()),
            decryptor,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Unframes a request body into plain JSON bytes.
    pub fn open(
        &self,
        body: &[u8],
        gzipped: bool,
        signature: Option<&str>,
    ) -> Result<Vec<u8>, CodecError> {
        let sealed = if gzipped {
            decompress(body)?
        } else {
            body.to_vec()
        };
        verify(&sealed, self.key.as_deref(), signature)?;
        self.decryptor.decrypt(&sealed)
    }

    pub fn decode<T: DeserializeOwned>(
        &self,
        body: &[u8],
        gzipped: bool,
        signature: Option<&str>,
    ) -> Result<T, CodecError> {
        let json = self.open(body, gzipped, signature)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
