//! Error taxonomy for the chat client.
//!
//! None of these reach the user as an error screen. Directory failures fall
//! back to the synthetic agent, transport failures are logged, malformed frames
//! are dropped. Only [`ChatError::InvalidUrl`] stops start-up.

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Directory fetch failed: connect/read error or a non-success status.
    #[error("agent directory request failed: {0}")]
    Network(String),

    /// Socket-level failure on the streaming connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound frame was not a JSON object with a string `content` field.
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no open connection")]
    NotConnected,
}

impl ChatError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Network(format!("server unreachable ({err})"))
        } else if let Some(status) = err.status() {
            Self::Network(format!("unexpected status {status}"))
        } else {
            Self::Network(err.to_string())
        }
    }

    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        match &err {
            tungstenite::Error::Io(io_err) => {
                Self::Transport(format!("{:?}: {io_err}", io_err.kind()))
            }
            tungstenite::Error::Http(resp) => {
                Self::Transport(format!("handshake rejected with status {}", resp.status()))
            }
            _ => Self::Transport(err.to_string()),
        }
    }

    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
