use std::fmt::{Debug, Error as FmtError, Formatter};
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use super::event::CloseCode;
use super::events::Events;
use super::WebSocket;
use crate::error::WebSocketError;
use crate::lock_isolated::LockIsolated;

type Connect =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn WebSocket>, WebSocketError>> + Send + Sync>;

/// A connection that is established lazily.
///
/// The channel is created from a function that connects, and only connects
/// once [`ready()`](WebSocketChannel::ready()) is awaited. This lets the
/// connection be swapped for a [`FakeWebSocket`](crate::FakeWebSocket) in tests.
///
/// # Panics
///
/// Every method other than `ready()` panics if called before `ready()` has
/// succeeded.
pub struct WebSocketChannel {
    connection: LockIsolated<Option<Arc<dyn WebSocket>>>,
    connect: Connect,
}

impl WebSocketChannel {
    pub fn new<F, Fut>(connect: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn WebSocket>, WebSocketError>> + Send + 'static,
    {
        Self {
            connection: LockIsolated::new(None),
            connect: Box::new(move || connect().boxed()),
        }
    }

    /// Connects, replacing the connection of a previous call.
    pub async fn ready(&self) -> Result<(), WebSocketError> {
        let connection = (self.connect)().await?;
        let previous = self
            .connection
            .with_value(|slot| slot.replace(connection));
        if previous.is_some() {
            debug!("websocket channel reconnected, previous connection released");
        }
        Ok(())
    }

    /// Returns whether `ready()` has succeeded.
    pub fn is_ready(&self) -> bool {
        self.connection.value().is_some()
    }

    /// The underlying connection.
    pub fn connection(&self) -> Arc<dyn WebSocket> {
        match self.connection.value() {
            Some(connection) => connection,
            None => panic!("websocket channel used before ready()"),
        }
    }

    pub fn send_text(&self, text: String) {
        self.connection().send_text(text)
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        self.connection().send_binary(data)
    }

    pub fn close_with(&self, code: Option<CloseCode>, reason: Option<&str>) {
        self.connection().close_with(code, reason)
    }

    pub fn close(&self) {
        self.connection().close()
    }

    /// See [`WebSocket::events()`].
    pub fn events(&self) -> Events {
        self.connection().events()
    }
}

impl Debug for WebSocketChannel {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.debug_struct("WebSocketChannel")
            .field("ready", &self.is_ready())
            .finish()
    }
}
