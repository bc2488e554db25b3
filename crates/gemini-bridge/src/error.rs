use std::time::Duration;

use thiserror::Error;

use crate::types::UpstreamStatus;

/// Every terminal failure a [`Bridge::ask`](crate::Bridge::ask) call can end in.
///
/// Variants that originate from a classified upstream signal carry the
/// normalized [`UpstreamStatus`] so the HTTP layer can echo it to callers.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("question is required")]
    InvalidInput,

    #[error(
        "authentication required: gemini CLI is not authenticated. \
         Make sure the credential directory is mounted and logged in"
    )]
    AuthRequired,

    #[error("upstream rate limited: {}", .status.message)]
    UpstreamRateLimited { status: UpstreamStatus },

    #[error("model not found: {}", .status.message)]
    UpstreamModelNotFound { status: UpstreamStatus },

    #[error("upstream error ({}): {}", .status.http_status, .status.message)]
    Upstream { status: UpstreamStatus },

    #[error("timeout waiting for gemini response after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("no response from gemini")]
    NoResponse,

    #[error("gemini produced an empty response")]
    EmptyResponse,

    #[error("failed to start gemini: {0}")]
    ProcessSpawnFailure(String),

    #[error("gemini session is not running")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// The upstream status attached to this error, if it was classified.
    pub fn status(&self) -> Option<&UpstreamStatus> {
        match self {
            BridgeError::UpstreamRateLimited { status }
            | BridgeError::UpstreamModelNotFound { status }
            | BridgeError::Upstream { status } => Some(status),
            _ => None,
        }
    }

    /// Turn a classified status into the matching error variant.
    pub(crate) fn from_status(status: UpstreamStatus) -> Self {
        match status.http_status {
            429 => BridgeError::UpstreamRateLimited { status },
            404 => BridgeError::UpstreamModelNotFound { status },
            401 | 403 => BridgeError::AuthRequired,
            _ => BridgeError::Upstream { status },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
