//! Terminal chat client for remote conversational agents.
//!
//! Three pieces, leaf-first:
//!
//! - [`directory`]: fetches `GET {base}/agents` and tracks the selected agent,
//!   falling back to a single `base_agent` entry when the listing is empty or
//!   unreachable.
//! - [`message_log`]: the append-only transcript.
//! - [`session`]: the single live connection to `{base as ws(s)}/ws/{agent}`,
//!   replaced on every agent switch.
//!
//! [`transport`] is the tokio-tungstenite connection behind the session's
//! [`session::Connector`] seam, and [`tui`] renders everything with ratatui.

pub mod config;
pub mod directory;
pub mod error;
pub mod message_log;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod tui;

pub use error::ChatError;
