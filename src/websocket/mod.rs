pub mod builder;
mod channel;
pub mod event;
mod events;
mod failure;
mod fake;
mod scheme;
mod socket;
mod state;

use std::fmt::{Debug, Error as FmtError, Formatter};
use std::sync::Arc;

pub use channel::WebSocketChannel;
pub use event::{CloseCode, Event};
pub use events::Events;
pub use failure::{Disposition, FailureKind, FailureTable};
pub use fake::FakeWebSocket;
pub use socket::SocketWebSocket;

/// A callback receiving the [`Event`]s of a connection.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// A WebSocket connection, independent of what carries its bytes.
///
/// Implemented by [`SocketWebSocket`] for real connections and by
/// [`FakeWebSocket`] for in-memory pairs used in tests. Code written against
/// this trait (or `Arc<dyn WebSocket>`) works with either.
///
/// # Events
///
/// A connection delivers [`Event::Text`] and [`Event::Binary`] events as
/// messages arrive, followed by exactly one [`Event::Close`] when the
/// connection ends for any reason: a Close frame from the peer, a local
/// [`close()`](WebSocket::close()) answered by the peer, or a transport
/// failure. Errors are never delivered as events. After the Close event the
/// connection is closed for good, its observer is detached, and
/// [`close_code()`](WebSocket::close_code()) and
/// [`close_reason()`](WebSocket::close_reason()) are fixed.
///
/// Events can be consumed with a callback through [`listen()`](WebSocket::listen())
/// or as a [`Stream`](futures::Stream) through [`events()`](WebSocket::events()).
/// A connection has one observer at a time.
///
/// # Closing
///
/// Only the first call to [`close_with()`](WebSocket::close_with()) or
/// [`close()`](WebSocket::close()) has an effect. Once a close has been
/// requested, sends are silently ignored.
pub trait WebSocket: Send + Sync {
    /// Sends a Text message to the peer. Does nothing if the connection is closed.
    fn send_text(&self, text: String);

    /// Sends a Binary message to the peer. Does nothing if the connection is closed.
    fn send_binary(&self, data: Vec<u8>);

    /// Closes the connection.
    ///
    /// Sends a Close frame to the peer. If no `code` is given the peer sees
    /// [`CloseCode::NO_STATUS_RECEIVED`], and if no `reason` is given it sees
    /// an empty reason.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not [`CloseCode::NORMAL_CLOSURE`] or in `3000..=4999`,
    /// or if `reason` is longer than 123 bytes.
    fn close_with(&self, code: Option<CloseCode>, reason: Option<&str>);

    /// Makes `handler` the connection's observer, replacing the previous one.
    ///
    /// The returned token detaches `handler` when cancelled. Dropping the
    /// token leaves `handler` attached.
    fn listen(&self, handler: EventHandler) -> ObservationToken;

    /// The subprotocol negotiated with the peer, or the empty string if there is none.
    ///
    /// See [RFC-6455 1.9](https://tools.ietf.org/html/rfc6455#section-1.9).
    fn protocol(&self) -> &str;

    /// Returns whether the connection is closed.
    fn is_closed(&self) -> bool;

    /// The code the connection closed with, if it is closed.
    fn close_code(&self) -> Option<CloseCode>;

    /// The reason the connection closed with, if it is closed.
    fn close_reason(&self) -> Option<String>;

    /// Closes the connection without a status code or reason.
    /// The peer will see [`CloseCode::NO_STATUS_RECEIVED`].
    fn close(&self) {
        self.close_with(None, None)
    }

    /// Returns a [`Stream`](futures::Stream) of the events received from now on.
    ///
    /// The stream replaces the current observer and ends after the
    /// [`Event::Close`] event.
    fn events(&self) -> Events {
        let (sender, receiver) = flume::unbounded();
        let token = self.listen(Arc::new(move |event: Event| {
            // the receiving half is gone once the stream is dropped
            let _ = sender.send(event);
        }));
        Events::new(receiver, token)
    }
}

/// A registration created by [`WebSocket::listen()`].
pub struct ObservationToken {
    on_cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ObservationToken {
    pub(crate) fn new(on_cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// A token for a registration that was never made.
    pub(crate) fn inert() -> Self {
        Self { on_cancel: None }
    }

    /// Detaches the observer, unless it has already been replaced.
    pub fn cancel(mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl Debug for ObservationToken {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.debug_struct("ObservationToken")
            .field("active", &self.on_cancel.is_some())
            .finish()
    }
}
