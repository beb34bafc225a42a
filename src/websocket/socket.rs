use std::fmt::{Debug, Error as FmtError, Formatter};
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WireCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as TransportError, Message};
use tracing::{debug, trace, warn};

use super::builder::WebSocketBuilder;
use super::event::{CloseCode, Event};
use super::failure::{Disposition, FailureTable};
use super::state::{check_close_arguments, ConnectionCore};
use super::{EventHandler, ObservationToken, WebSocket};
use crate::error::WebSocketError;

/// Reason reported when the transport ends without a Close frame.
const ABNORMAL_CLOSE_REASON: &str = "abnormal close";

/// Work handed from connection handles to the driver task.
#[derive(Debug)]
enum Command {
    Send(Message),
    Close(Option<CloseFrame>),
}

/// How the driver task stopped reading.
enum Ending {
    /// The transport finished on its own.
    Completed,
    /// The transport failed in a way that closes the connection.
    Failed(CloseCode, TransportError),
}

/// A [`WebSocket`] connected over the network.
///
/// The transport is driven by a background tokio task which owns the socket.
/// Sends and closes are queued to that task and return immediately, and
/// messages are delivered to the observer from that task, one at a time.
///
/// Handles are cheap to clone. When the last handle is dropped the task sends
/// a Close frame and finishes the closing handshake on its own.
#[derive(Clone)]
pub struct SocketWebSocket {
    inner: Arc<SocketInner>,
}

struct SocketInner {
    protocol: String,
    core: Arc<ConnectionCore>,
    commands: flume::Sender<Command>,
}

impl SocketWebSocket {
    /// Returns a builder used to customize the connection.
    pub fn builder() -> WebSocketBuilder {
        WebSocketBuilder::new()
    }

    /// Connects to a URL with the default configuration.
    pub async fn connect(url: &str) -> Result<Self, WebSocketError> {
        WebSocketBuilder::new().connect(url).await
    }

    /// Adopts an already established session.
    ///
    /// `protocol` is the subprotocol negotiated during its handshake. Must be
    /// called from within a tokio runtime.
    pub fn from_stream<S>(stream: S, protocol: impl Into<String>, failures: FailureTable) -> Self
    where
        S: Stream<Item = Result<Message, TransportError>>
            + Sink<Message, Error = TransportError>
            + Unpin
            + Send
            + 'static,
    {
        let core = ConnectionCore::new();
        let (commands, receiver) = flume::unbounded();
        tokio::spawn(drive(stream, receiver, Arc::clone(&core), failures));
        Self {
            inner: Arc::new(SocketInner {
                protocol: protocol.into(),
                core,
                commands,
            }),
        }
    }

    /// Queues `command` unless a close has already been requested or completed.
    ///
    /// The check and the enqueue happen in one step, so nothing can be queued
    /// behind a Close frame.
    fn enqueue(&self, command: Command) {
        let inner = &self.inner;
        inner.core.with_state(|state| {
            if state.closed || state.close_requested {
                trace!(?command, "websocket closing, command dropped");
                return;
            }
            if let Command::Close(_) = command {
                state.close_requested = true;
            }
            if let Err(e) = inner.commands.send(command) {
                trace!(command = ?e.into_inner(), "driver task has ended, command dropped");
            }
        });
    }
}

impl WebSocket for SocketWebSocket {
    fn send_text(&self, text: String) {
        self.enqueue(Command::Send(Message::text(text)));
    }

    fn send_binary(&self, data: Vec<u8>) {
        self.enqueue(Command::Send(Message::binary(data)));
    }

    fn close_with(&self, code: Option<CloseCode>, reason: Option<&str>) {
        if self
            .inner
            .core
            .with_state(|state| state.closed || state.close_requested)
        {
            return;
        }
        check_close_arguments(code, reason);
        // https://tools.ietf.org/html/rfc6455#section-5.5.1
        // a reason can only be sent along with a code
        let frame = code.map(|code| CloseFrame {
            code: WireCloseCode::from(code.code()),
            reason: String::from(reason.unwrap_or_default()).into(),
        });
        self.enqueue(Command::Close(frame));
    }

    fn listen(&self, handler: EventHandler) -> ObservationToken {
        self.inner.core.listen(handler)
    }

    fn protocol(&self) -> &str {
        &self.inner.protocol
    }

    fn is_closed(&self) -> bool {
        self.inner.core.is_closed()
    }

    fn close_code(&self) -> Option<CloseCode> {
        self.inner.core.close_code()
    }

    fn close_reason(&self) -> Option<String> {
        self.inner.core.close_reason()
    }
}

impl Debug for SocketWebSocket {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.debug_struct("SocketWebSocket")
            .field("protocol", &self.inner.protocol)
            .field("state", &self.inner.core)
            .finish()
    }
}

/// Runs the session until it ends, then delivers the Close event if the
/// session did not already deliver one.
async fn drive<S>(
    stream: S,
    commands: flume::Receiver<Command>,
    core: Arc<ConnectionCore>,
    failures: FailureTable,
) where
    S: Stream<Item = Result<Message, TransportError>> + Sink<Message, Error = TransportError>,
{
    let (mut sink, mut source) = stream.split();
    let mut handles_alive = true;

    let ending = loop {
        tokio::select! {
            command = commands.recv_async(), if handles_alive => {
                let result = match command {
                    Ok(Command::Send(message)) => sink.send(message).await,
                    Ok(Command::Close(frame)) => {
                        debug!(?frame, "sending close frame");
                        sink.send(Message::Close(frame)).await
                    }
                    Err(_) => {
                        handles_alive = false;
                        if core.is_closed() {
                            Ok(())
                        } else {
                            debug!("all handles dropped, closing websocket");
                            sink.send(Message::Close(None)).await
                        }
                    }
                };
                if let Err(e) = result {
                    match failures.classify(&e) {
                        // the read side reports how the session ended
                        Disposition::Defer => debug!(error = %e, "send failed, deferring to session end"),
                        Disposition::Close(code) => break Ending::Failed(code, e),
                    }
                }
            }
            // one message per iteration; the read is re-armed on the next pass
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        core.deliver(Event::Text((*text).to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        core.deliver(Event::Binary(data.to_vec()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        // https://tools.ietf.org/html/rfc6455#section-7.1.5
                        let (code, reason) = match frame {
                            Some(frame) => (
                                CloseCode::from_wire(frame.code.into()),
                                (*frame.reason).to_owned(),
                            ),
                            None => (CloseCode::NO_STATUS_RECEIVED, String::new()),
                        };
                        debug!(%code, %reason, "received close frame");
                        core.deliver(Event::Close {
                            code: Some(code),
                            reason,
                        });
                    }
                    // ping, pong and raw frames are answered by the transport
                    Some(Ok(_)) => (),
                    // a failed read ends the session either way
                    Some(Err(e)) => match failures.classify(&e) {
                        Disposition::Defer => {
                            debug!(error = %e, "read failed, session ended");
                            break Ending::Completed;
                        }
                        Disposition::Close(code) => break Ending::Failed(code, e),
                    },
                    None => break Ending::Completed,
                }
            }
        }
    };

    // cancel the session before reporting how it ended
    drop(sink);
    drop(source);

    match ending {
        Ending::Completed => {
            if core.deliver(Event::Close {
                code: Some(CloseCode::ABNORMAL_CLOSURE),
                reason: ABNORMAL_CLOSE_REASON.into(),
            }) {
                warn!("websocket ended without a close frame");
            } else {
                debug!("websocket session ended");
            }
        }
        Ending::Failed(code, e) => {
            warn!(error = %e, %code, "websocket session failed");
            core.deliver(Event::Close {
                code: Some(code),
                reason: e.to_string(),
            });
        }
    }
}
