use std::collections::HashMap;
use std::io::ErrorKind;

use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::Error as TransportError;

use super::event::CloseCode;

/// The category of a transport failure, as far as closing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The socket is no longer connected.
    NotConnected,
    /// The closing handshake already completed.
    ConnectionClosed,
    /// The connection was used after it had been closed.
    AlreadyClosed,
    /// A message was sent after a Close frame.
    SendAfterClosing,
    /// The peer dropped the connection without a closing handshake.
    Reset,
    /// The peer violated the protocol.
    Protocol,
    /// A message or frame exceeded the configured limits.
    Capacity,
    /// A Text message was not valid UTF-8.
    Utf8,
    /// Any other I/O error.
    Io,
    /// A TLS error.
    Tls,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Categorizes an error reported by the transport.
    pub fn of(error: &TransportError) -> Self {
        match error {
            TransportError::ConnectionClosed => Self::ConnectionClosed,
            TransportError::AlreadyClosed => Self::AlreadyClosed,
            TransportError::Io(e) if e.kind() == ErrorKind::NotConnected => Self::NotConnected,
            TransportError::Io(_) => Self::Io,
            TransportError::Protocol(ProtocolError::SendAfterClosing) => Self::SendAfterClosing,
            TransportError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => Self::Reset,
            TransportError::Protocol(_) => Self::Protocol,
            TransportError::Capacity(_) => Self::Capacity,
            TransportError::Utf8 { .. } => Self::Utf8,
            TransportError::Tls(_) => Self::Tls,
            _ => Self::Other,
        }
    }
}

/// What a connection does when its transport fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Don't report the failure itself. A failed send waits for the read side
    /// to finish, and a failed read ends the session. If no Close frame was
    /// received by then the connection closes with
    /// [`CloseCode::ABNORMAL_CLOSURE`] and a generic reason.
    Defer,
    /// Close the connection with this code, using the error text as the reason.
    Close(CloseCode),
}

/// Maps transport failures to how the connection closes.
///
/// The default table defers failures meaning the socket is already
/// disconnected (the transport reports the close itself), maps protocol,
/// capacity and encoding failures to their close codes, and closes with
/// [`CloseCode::ABNORMAL_CLOSURE`] for everything else.
#[derive(Debug, Clone)]
pub struct FailureTable {
    entries: HashMap<FailureKind, Disposition>,
    fallback: CloseCode,
}

impl FailureTable {
    /// Creates a table that closes with `fallback` for every failure.
    pub fn new(fallback: CloseCode) -> Self {
        Self {
            entries: HashMap::new(),
            fallback,
        }
    }

    /// Sets what happens for failures of `kind`.
    pub fn with(mut self, kind: FailureKind, disposition: Disposition) -> Self {
        self.entries.insert(kind, disposition);
        self
    }

    pub fn disposition(&self, kind: FailureKind) -> Disposition {
        self.entries
            .get(&kind)
            .copied()
            .unwrap_or(Disposition::Close(self.fallback))
    }

    pub fn classify(&self, error: &TransportError) -> Disposition {
        self.disposition(FailureKind::of(error))
    }
}

impl Default for FailureTable {
    fn default() -> Self {
        Self::new(CloseCode::ABNORMAL_CLOSURE)
            .with(FailureKind::NotConnected, Disposition::Defer)
            .with(FailureKind::ConnectionClosed, Disposition::Defer)
            .with(FailureKind::AlreadyClosed, Disposition::Defer)
            .with(FailureKind::SendAfterClosing, Disposition::Defer)
            .with(
                FailureKind::Protocol,
                Disposition::Close(CloseCode::PROTOCOL_ERROR),
            )
            .with(
                FailureKind::Capacity,
                Disposition::Close(CloseCode::MESSAGE_TOO_BIG),
            )
            .with(
                FailureKind::Utf8,
                Disposition::Close(CloseCode::INVALID_FRAME_PAYLOAD_DATA),
            )
    }
}
