//! Wire format for the agent server: directory listing, chat frames and
//! endpoint derivation from the configured base URL.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Agent name used whenever the directory cannot provide one.
pub const FALLBACK_AGENT: &str = "base_agent";

/// A selectable remote agent. Identity is the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn fallback() -> Self {
        Self::new(FALLBACK_AGENT)
    }
}

/// Client → server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub message: String,
}

impl OutboundFrame {
    pub fn encode(&self) -> String {
        // A struct with one String field cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Server → client frame. Extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundFrame {
    pub content: String,
}

impl InboundFrame {
    pub fn decode(raw: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Parse and validate the configured server URL. Only http and https are accepted.
pub fn parse_base_url(raw: &str) -> Result<Url, ChatError> {
    let url = Url::parse(raw.trim()).map_err(|e| ChatError::invalid_url(raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ChatError::invalid_url(
            raw,
            format!("unsupported scheme '{other}' (expected http or https)"),
        )),
    }
}

/// `{base}/agents`
pub fn agents_url(base: &Url) -> Url {
    let mut url = base.clone();
    push_segments(&mut url, &["agents"]);
    url
}

/// `{base with ws(s) scheme}/ws/{agent}`. The agent name is percent-encoded
/// as a single path segment.
pub fn ws_url(base: &Url, agent: &str) -> Result<Url, ChatError> {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ChatError::invalid_url(
                base.as_str(),
                format!("cannot derive a websocket scheme from '{other}'"),
            ));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ChatError::invalid_url(base.as_str(), "scheme rewrite rejected"))?;
    push_segments(&mut url, &["ws", agent]);
    Ok(url)
}

fn push_segments(url: &mut Url, segments: &[&str]) {
    url.set_query(None);
    url.set_fragment(None);
    // http(s) and ws(s) URLs always have a base, so path_segments_mut succeeds
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
}
