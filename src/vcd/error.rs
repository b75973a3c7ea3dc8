//! Error types for VCD API interaction

use thiserror::Error;

/// Result type alias for VCD operations.
pub type VcdResult<T> = Result<T, VcdError>;

/// Errors raised by the transport, poller, catalog and façade.
#[derive(Debug, Error)]
pub enum VcdError {
    /// A GET returned a non-2xx status
    #[error("HTTP request failed: {status} - {body}")]
    Transport { status: u16, body: String },

    /// A mutating call was not accepted with 202
    #[error("Task submission failed. Code: {status}, Data: {body}")]
    SubmissionFailed { status: u16, body: String },

    #[error("Authentication failed: {status}")]
    Authentication { status: u16 },

    /// The name was referenced before its parent scope was listed
    #[error("Could not locate configuration for {class}: {name}")]
    NotDiscovered { class: &'static str, name: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IP address allocation mode should be one of 'POOL' or 'DHCP', got '{0}'")]
    InvalidIpMode(String),

    #[error("Network has not been discovered: {0}")]
    UnknownNetwork(String),

    #[error("Template has not been discovered: {0}")]
    UnknownTemplate(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl VcdError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. }
            | Self::SubmissionFailed { status, .. }
            | Self::Authentication { status } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
