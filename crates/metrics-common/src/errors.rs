// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// A metric record that does not satisfy the record shape rules.
///
/// Validation errors are always terminal: they are reported to the caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("field 'id' is required")]
    MissingId,

    #[error("field 'type' must have a value of 'gauge' or 'counter', got '{0}'")]
    UnknownKind(String),

    #[error("field 'value' is required (with the 'gauge' type)")]
    MissingValue,

    #[error("field 'delta' is required (with the 'counter' type)")]
    MissingDelta,

    #[error("field '{field}' is not allowed with the '{kind}' type")]
    UnexpectedField {
        field: &'static str,
        kind: &'static str,
    },

    #[error("empty metrics batch")]
    EmptyBatch,

    #[error("invalid {kind} value '{raw}'")]
    InvalidValue { kind: &'static str, raw: String },

    #[error("counter '{name}' would overflow")]
    CounterOverflow { name: String },
}

/// Failures while framing or unframing a payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("signature header is not valid hex")]
    MalformedSignature,

    #[error("signature does not match payload")]
    SignatureMismatch,

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse key: {0}")]
    KeyParse(String),

    #[error("encryption failed: {0}")]
    Encryption(#[source] rsa::Error),

    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Invalid or unreadable startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    FileFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value '{value}' for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ValidationError::UnknownKind("histogram".to_string()).to_string(),
            "field 'type' must have a value of 'gauge' or 'counter', got 'histogram'"
        );
        assert_eq!(
            ValidationError::UnexpectedField {
                field: "delta",
                kind: "gauge"
            }
            .to_string(),
            "field 'delta' is not allowed with the 'gauge' type"
        );
    }

    #[test]
    fn test_codec_error_debug() {
        let error = CodecError::SignatureMismatch;
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("SignatureMismatch"));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::InvalidEnv {
            name: "RATE_LIMIT",
            value: "many".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value 'many' for RATE_LIMIT");
    }
}
