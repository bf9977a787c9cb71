//! WebSocket implementation of [`Connector`] on tokio-tungstenite.
//!
//! Each connection runs in its own task that owns the socket. The handle
//! only holds a command channel, so closing or dropping it never blocks the
//! caller. Connections made by one connector are strictly sequential on the
//! wire: a task does not dial until the previous task has finished its close
//! handshake.

use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::session::{Connection, Connector, EventSender, Generation, SessionEvent, TransportEvent};

/// Upper bound on tearing down one socket (finishing an abandoned handshake or
/// waiting for the peer to drop its end) before the next connection dials.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

enum Command {
    Text(String),
    Close,
}

/// Spawns one tokio task per connection. Must be used inside a runtime.
#[derive(Debug, Default)]
pub struct WsConnector {
    /// Task of the most recent connection; the next one waits for it.
    previous: Option<JoinHandle<()>>,
}

impl Connector for WsConnector {
    fn connect(
        &mut self,
        url: Url,
        generation: Generation,
        events: EventSender,
    ) -> Box<dyn Connection> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.previous.take();
        self.previous = Some(tokio::spawn(run_connection(
            url, generation, events, rx, previous,
        )));
        Box::new(WsConnection {
            commands: tx,
            closed: false,
        })
    }
}

pub struct WsConnection {
    commands: mpsc::UnboundedSender<Command>,
    closed: bool,
}

impl Connection for WsConnection {
    fn send_text(&mut self, text: String) -> Result<(), ChatError> {
        if self.closed {
            return Err(ChatError::NotConnected);
        }
        self.commands
            .send(Command::Text(text))
            .map_err(|_| ChatError::NotConnected)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            // Task already gone if this fails
            let _ = self.commands.send(Command::Close);
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    url: Url,
    generation: Generation,
    events: EventSender,
    mut commands: mpsc::UnboundedReceiver<Command>,
    previous: Option<JoinHandle<()>>,
) {
    let emit = |event: TransportEvent| {
        // Receiver gone means the controller is gone; nothing left to tell.
        let _ = events.send(SessionEvent { generation, event });
    };

    if let Some(previous) = previous {
        // Only fails if the previous task panicked, and then its socket is gone
        let _ = previous.await;
    }
    if close_pending(&mut commands) {
        debug!(generation, "closed before dialing");
        emit(TransportEvent::Closed);
        return;
    }

    let handshake = tokio_tungstenite::connect_async(url.as_str());
    tokio::pin!(handshake);
    let connected = tokio::select! {
        result = &mut handshake => result,
        () = wait_for_close(&mut commands) => {
            debug!(generation, "closed during handshake");
            // Let the handshake settle so the server sees an orderly close
            // rather than a half-open socket.
            if let Ok(Ok((ws, _response))) = tokio::time::timeout(CLOSE_TIMEOUT, handshake).await {
                let (mut ws_write, ws_read) = ws.split();
                let _ = ws_write.close().await;
                drain_until_closed(ws_read, generation).await;
            }
            emit(TransportEvent::Closed);
            return;
        }
    };

    let ws = match connected {
        Ok((ws, _response)) => ws,
        Err(e) => {
            emit(TransportEvent::Error(ChatError::from_tungstenite(e)));
            emit(TransportEvent::Closed);
            return;
        }
    };
    debug!(%url, generation, "websocket connected");
    emit(TransportEvent::Opened);

    let (mut ws_write, mut ws_read) = ws.split();

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Text(text)) => {
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        emit(TransportEvent::Error(ChatError::from_tungstenite(e)));
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    debug!(generation, "closing websocket");
                    let _ = ws_write.close().await;
                    drain_until_closed(ws_read, generation).await;
                    break;
                }
            },

            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => emit(TransportEvent::Frame(text)),
                    Err(_) => warn!(generation, len = data.len(), "dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(generation, ?frame, "server closed websocket");
                    break;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEvent::Error(ChatError::from_tungstenite(e)));
                    break;
                }
                None => break,
            },
        }
    }

    emit(TransportEvent::Closed);
}

/// True if a close was requested (or the handle dropped) before the socket
/// existed. Queued text is discarded; the controller never sends before open.
fn close_pending(commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(Command::Close) | Err(mpsc::error::TryRecvError::Disconnected) => return true,
            Ok(Command::Text(_)) => continue,
            Err(mpsc::error::TryRecvError::Empty) => return false,
        }
    }
}

async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(cmd) = commands.recv().await {
        if let Command::Close = cmd {
            return;
        }
    }
}

/// After sending our close frame, read until the peer drops its end so the
/// next connection is not dialed while this one is still alive server-side.
async fn drain_until_closed<S>(mut ws_read: S, generation: Generation)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let drained = tokio::time::timeout(CLOSE_TIMEOUT, async {
        while let Some(Ok(_)) = ws_read.next().await {}
    })
    .await;
    if drained.is_err() {
        debug!(generation, "peer did not finish close handshake in time");
    }
}
