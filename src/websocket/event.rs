use std::fmt::{Display, Error as FmtError, Formatter};

/// Maximum length of a close reason in bytes (https://tools.ietf.org/html/rfc6455#section-5.5)
pub const MAX_CLOSE_REASON_LEN: usize = 123;

/// Something received from the peer, or the end of the connection.
///
/// A connection produces any number of [`Text`](Event::Text) and
/// [`Binary`](Event::Binary) events followed by at most one
/// [`Close`](Event::Close) event, which is always the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A Text message
    Text(String),
    /// A Binary message
    Binary(Vec<u8>),
    /// The connection closed.
    ///
    /// Either the peer sent a Close frame, in which case `code` and `reason`
    /// are the peer's, or the connection failed, in which case `code` is a
    /// status synthesized locally (such as [`CloseCode::ABNORMAL_CLOSURE`]).
    Close {
        /// The close status code
        code: Option<CloseCode>,
        /// The close reason, empty if none was given
        reason: String,
    },
}

impl Event {
    /// Returns whether the event is a Close event.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close { .. })
    }

    /// Attempts to interpret the event as a Text event,
    /// returning a reference to the payload if it is,
    /// and None otherwise.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(payload) => Some(payload),
            _ => None,
        }
    }

    /// Attempts to interpret the event as a Binary event,
    /// returning a reference to the payload if it is,
    /// and None otherwise.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(payload) => Some(payload),
            _ => None,
        }
    }

    /// Attempts to interpret the event as a Close event,
    /// returning the code and reason if it is,
    /// and None otherwise.
    pub fn as_close(&self) -> Option<(Option<CloseCode>, &str)> {
        match self {
            Self::Close { code, reason } => Some((*code, reason)),
            _ => None,
        }
    }
}

// https://tools.ietf.org/html/rfc6455#section-7.4.1
/// A WebSocket close status code.
///
/// Codes reported by the peer are kept as received. Codes passed to
/// [`WebSocket::close_with()`](crate::WebSocket::close_with()) must be
/// [`NORMAL_CLOSURE`](CloseCode::NORMAL_CLOSURE) or an application code in `3000..=4999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloseCode(u16);

impl CloseCode {
    pub const NORMAL_CLOSURE: Self = Self(1000);
    pub const GOING_AWAY: Self = Self(1001);
    pub const PROTOCOL_ERROR: Self = Self(1002);
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    /// Never sent; reported when a Close frame carried no status.
    pub const NO_STATUS_RECEIVED: Self = Self(1005);
    /// Never sent; reported when the connection dropped without a Close frame.
    pub const ABNORMAL_CLOSURE: Self = Self(1006);
    pub const INVALID_FRAME_PAYLOAD_DATA: Self = Self(1007);
    pub const POLICY_VIOLATION: Self = Self(1008);
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    pub const MANDATORY_EXTENSION_MISSING: Self = Self(1010);
    pub const INTERNAL_SERVER_ERROR: Self = Self(1011);
    /// Never sent; reported when the TLS handshake failed.
    pub const TLS_HANDSHAKE_FAILURE: Self = Self(1015);

    /// Creates a close code, returning None if `code` is neither a registered
    /// status nor in the application range `3000..=4999`.
    pub fn new(code: u16) -> Option<Self> {
        match code {
            1000..=1003 | 1005..=1011 | 1015 | 3000..=4999 => Some(Self(code)),
            _ => None,
        }
    }

    /// Creates an application defined close code in `3000..=4999`.
    pub fn application(code: u16) -> Option<Self> {
        match code {
            3000..=4999 => Some(Self(code)),
            _ => None,
        }
    }

    /// Wraps a code read off the wire without checking it against the registry.
    pub(crate) fn from_wire(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric value of the code.
    pub fn code(self) -> u16 {
        self.0
    }

    /// Returns whether the code may be passed to a local close.
    pub fn is_sendable(self) -> bool {
        self == Self::NORMAL_CLOSURE || (3000..=4999).contains(&self.0)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl Display for CloseCode {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}
