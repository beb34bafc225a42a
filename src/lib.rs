//! A WebSocket connection abstraction with interchangeable transports.
//!
//! [`WebSocket`] is the contract: send Text and Binary messages, close with a
//! code and reason, and observe [`Event`]s. [`SocketWebSocket`] implements it
//! over a real connection, and [`FakeWebSocket`] implements it as an in-memory
//! pair for tests.
//!
//! ```no_run
//! use futures::StreamExt;
//! use websockets_core::{Event, SocketWebSocket, WebSocket, WebSocketError};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), WebSocketError> {
//! let ws = SocketWebSocket::connect("wss://echo.websocket.org").await?;
//! let mut events = ws.events();
//! ws.send_text("hello".into());
//! while let Some(event) = events.next().await {
//!     if let Event::Text(text) = event {
//!         println!("{}", text);
//!         ws.close();
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod error;
mod lock_isolated;
mod websocket;

pub use error::WebSocketError;
pub use lock_isolated::LockIsolated;
pub use websocket::builder::{Certificate, Identity, Protocol, WebSocketBuilder};
pub use websocket::event::MAX_CLOSE_REASON_LEN;
pub use websocket::{
    CloseCode, Disposition, Event, EventHandler, Events, FailureKind, FailureTable,
    FakeWebSocket, ObservationToken, SocketWebSocket, WebSocket, WebSocketChannel,
};
