//! Session controller: owns the single live connection to the selected agent.
//!
//! The controller never blocks. Opening, reading and closing happen inside
//! whatever the [`Connector`] spawns; those tasks report back through
//! [`SessionEvent`]s on one channel, which the owner drains and feeds to
//! [`SessionController::handle_event`] in delivery order. Every connection is
//! stamped with a generation number, and events from any generation other than
//! the active one are discarded. After a cutover the old connection can
//! still flush events into the channel, but none of them reach the log.

use std::fmt;

use reqwest::Url;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::message_log::{ChatMessage, MessageLog};
use crate::protocol::{self, InboundFrame, OutboundFrame};

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// What a transport reports about one connection.
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Error(ChatError),
    Closed,
}

#[derive(Debug)]
pub struct SessionEvent {
    pub generation: Generation,
    pub event: TransportEvent,
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Handle to one live connection.
pub trait Connection: Send {
    /// Queue a text frame for transmission.
    fn send_text(&mut self, text: String) -> Result<(), ChatError>;

    /// Close regardless of current state. Idempotent.
    fn close(&mut self);
}

/// Opens connections. `connect` returns immediately; progress is reported on
/// `events`, every event stamped with `generation`.
pub trait Connector: Send {
    fn connect(&mut self, url: Url, generation: Generation, events: EventSender)
    -> Box<dyn Connection>;
}

struct ActiveConnection {
    agent: String,
    generation: Generation,
    state: SessionState,
    conn: Box<dyn Connection>,
}

pub struct SessionController<C: Connector> {
    base_url: Url,
    connector: C,
    events: EventSender,
    active: Option<ActiveConnection>,
    next_generation: Generation,
    log: MessageLog,
    input: String,
}

impl<C: Connector> SessionController<C> {
    /// Returns the controller and the receiving end of its event channel.
    pub fn new(base_url: Url, connector: C, log: MessageLog) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            base_url,
            connector,
            events,
            active: None,
            next_generation: 1,
            log,
            input: String::new(),
        };
        (controller, rx)
    }

    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Disconnected, |a| a.state)
    }

    /// Agent of the active connection, if any.
    pub fn agent(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.agent.as_str())
    }

    pub fn generation(&self) -> Option<Generation> {
        self.active.as_ref().map(|a| a.generation)
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    /// Replace the active connection with a new one to `name`. The old
    /// connection is closed and discarded before the new one is requested.
    pub fn select_agent(&mut self, name: &str) -> Result<(), ChatError> {
        let url = protocol::ws_url(&self.base_url, name)?;

        self.close();

        let generation = self.next_generation;
        self.next_generation += 1;
        info!(agent = name, %url, generation, "opening session");
        let conn = self.connector.connect(url, generation, self.events.clone());
        self.active = Some(ActiveConnection {
            agent: name.to_string(),
            generation,
            state: SessionState::Connecting,
            conn,
        });
        Ok(())
    }

    /// Close and drop the active connection, if any.
    pub fn close(&mut self) {
        if let Some(mut old) = self.active.take() {
            debug!(
                agent = %old.agent,
                generation = old.generation,
                state = %old.state,
                "closing session"
            );
            old.conn.close();
        }
    }

    /// Apply one transport event. Events from stale generations are dropped.
    pub fn handle_event(&mut self, event: SessionEvent) {
        let Some(active) = self.active.as_ref() else {
            debug!(generation = event.generation, "dropping event, no active session");
            return;
        };
        if active.generation != event.generation {
            debug!(
                generation = event.generation,
                active = active.generation,
                "dropping event from replaced session"
            );
            return;
        }

        match event.event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Frame(raw) => self.on_frame_received(&raw),
            TransportEvent::Error(err) => self.on_transport_error(&err),
            TransportEvent::Closed => self.on_closed(),
        }
    }

    fn on_opened(&mut self) {
        if let Some(active) = self.active.as_mut() {
            info!(agent = %active.agent, "session open");
            active.state = SessionState::Open;
        }
    }

    /// Decode an inbound frame and append it as an agent line. Malformed
    /// frames are logged and dropped; the session stays up.
    pub fn on_frame_received(&mut self, raw: &str) {
        match InboundFrame::decode(raw) {
            Ok(frame) => self.log.append(ChatMessage::agent(frame.content)),
            Err(e) => warn!(error = %e, len = raw.len(), "dropping malformed frame"),
        }
    }

    /// Logged only: no reconnect, no state change. The transport reports
    /// `Closed` separately if the connection is gone.
    pub fn on_transport_error(&mut self, err: &ChatError) {
        warn!(agent = self.agent().unwrap_or("-"), error = %err, "session transport error");
    }

    /// The connection ended. The slot goes back to `Disconnected`.
    fn on_closed(&mut self) {
        if let Some(mut old) = self.active.take() {
            old.state = SessionState::Closed;
            info!(agent = %old.agent, generation = old.generation, "session closed");
            old.conn.close();
        }
    }

    /// Echo `text` into the log and transmit it. Whitespace-only text and
    /// sends without an open session are no-ops. Returns whether anything was
    /// sent.
    pub fn send_user_message(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(active) = self.active.as_mut() else {
            debug!("send ignored, no session");
            return false;
        };
        if active.state != SessionState::Open {
            debug!(state = %active.state, "send ignored, session not open");
            return false;
        }

        self.log.append(ChatMessage::user(text));

        let payload = OutboundFrame {
            message: text.to_string(),
        }
        .encode();
        if let Err(e) = active.conn.send_text(payload) {
            warn!(agent = %active.agent, error = %e, "failed to queue message");
        }
        true
    }

    /// Send the input buffer, clearing it if the send went through.
    pub fn submit_input(&mut self) -> bool {
        let text = std::mem::take(&mut self.input);
        if self.send_user_message(&text) {
            true
        } else {
            self.input = text;
            false
        }
    }
}

impl<C: Connector> Drop for SessionController<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connector> fmt::Debug for SessionController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("base_url", &self.base_url.as_str())
            .field("agent", &self.agent())
            .field("state", &self.state())
            .field("log_len", &self.log.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Local};

    use super::*;

    /// Everything the fake transport was asked to do, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Connect { url: String, generation: Generation },
        Send { generation: Generation, text: String },
        Close { generation: Generation },
    }

    #[derive(Clone, Default)]
    pub struct FakeConnector {
        pub calls: Arc<Mutex<Vec<Call>>>,
        /// Wall-clock time of every `send_text`, in call order.
        pub sent_at: Arc<Mutex<Vec<DateTime<Local>>>>,
        pub fail_sends: bool,
        pub senders: Arc<Mutex<Vec<(Generation, EventSender)>>>,
    }

    impl FakeConnector {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Deliver `event` on the channel handed to connection `generation`,
        /// as the real transport task would.
        pub fn emit(&self, generation: Generation, event: TransportEvent) {
            let senders = self.senders.lock().unwrap();
            let (_, tx) = senders
                .iter()
                .find(|(g, _)| *g == generation)
                .expect("no connection with that generation");
            tx.send(SessionEvent { generation, event }).unwrap();
        }
    }

    struct FakeConnection {
        generation: Generation,
        calls: Arc<Mutex<Vec<Call>>>,
        sent_at: Arc<Mutex<Vec<DateTime<Local>>>>,
        fail_sends: bool,
        closed: bool,
    }

    impl Connection for FakeConnection {
        fn send_text(&mut self, text: String) -> Result<(), ChatError> {
            self.sent_at.lock().unwrap().push(Local::now());
            self.calls.lock().unwrap().push(Call::Send {
                generation: self.generation,
                text,
            });
            if self.fail_sends {
                Err(ChatError::Transport("channel closed".into()))
            } else {
                Ok(())
            }
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.calls.lock().unwrap().push(Call::Close {
                    generation: self.generation,
                });
            }
        }
    }

    impl Connector for FakeConnector {
        fn connect(
            &mut self,
            url: Url,
            generation: Generation,
            events: EventSender,
        ) -> Box<dyn Connection> {
            self.calls.lock().unwrap().push(Call::Connect {
                url: url.to_string(),
                generation,
            });
            self.senders.lock().unwrap().push((generation, events));
            Box::new(FakeConnection {
                generation,
                calls: self.calls.clone(),
                sent_at: self.sent_at.clone(),
                fail_sends: self.fail_sends,
                closed: false,
            })
        }
    }
}
