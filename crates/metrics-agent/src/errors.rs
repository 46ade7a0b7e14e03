// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_common::errors::{CodecError, ConfigError};

use crate::sender::SendError;

/// Startup failures of the agent binary.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load encryption key: {0}")]
    Key(#[from] CodecError),

    #[error("failed to build HTTP sender: {0}")]
    Sender(#[from] SendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let error = AgentError::Config(ConfigError::Invalid("bad".to_string()));
        assert_eq!(
            error.to_string(),
            "configuration error: invalid configuration: bad"
        );
    }

    #[test]
    fn test_missing_key_file_is_reported() {
        let config = crate::config::AgentConfig {
            crypto_key: Some("/nonexistent/public.pem".to_string()),
            ..Default::default()
        };
        let error = crate::agent::Agent::from_config(&config).err().unwrap();
        assert!(matches!(error, AgentError::Key(CodecError::KeyFile { .. })));
    }
}
