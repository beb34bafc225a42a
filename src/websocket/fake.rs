use std::fmt::{Debug, Error as FmtError, Formatter};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::event::{CloseCode, Event};
use super::state::{check_close_arguments, ConnectionCore};
use super::{EventHandler, ObservationToken, WebSocket};
use crate::lock_isolated::LockIsolated;

/// One end of an in-memory pair of connected [`WebSocket`]s.
///
/// Sending on one end delivers the message to the other end's observer
/// synchronously, before `send_text()` returns, unless another thread is
/// delivering to that end at the same moment (it then hands the message over
/// in order). This makes the pair useful for testing code written against
/// [`WebSocket`] without a network.
///
/// Each end only holds a weak link to the other, so dropping one end never
/// keeps the other alive. An end whose peer has been dropped behaves as if the
/// peer were closed.
///
/// ```
/// use websockets_core::{Event, FakeWebSocket, WebSocket};
///
/// let (client, server) = FakeWebSocket::pair();
/// client.send_text("ping".into());
/// assert_eq!(server.received_events(), vec![Event::Text("ping".into())]);
/// ```
#[derive(Clone)]
pub struct FakeWebSocket {
    inner: Arc<FakeInner>,
}

struct FakeInner {
    protocol: String,
    core: Arc<ConnectionCore>,
    other: LockIsolated<Weak<FakeInner>>,
    sent: Mutex<Vec<Event>>,
}

impl FakeWebSocket {
    fn new(protocol: &str) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                protocol: protocol.into(),
                core: ConnectionCore::new(),
                other: LockIsolated::new(Weak::new()),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a pair of fake [`WebSocket`]s connected to each other,
    /// both reporting `protocol` as the negotiated subprotocol.
    pub fn fakes(protocol: &str) -> (Self, Self) {
        let (peer1, peer2) = (Self::new(protocol), Self::new(protocol));
        peer1
            .inner
            .other
            .with_value(|other| *other = Arc::downgrade(&peer2.inner));
        peer2
            .inner
            .other
            .with_value(|other| *other = Arc::downgrade(&peer1.inner));
        (peer1, peer2)
    }

    /// Creates a pair of fake [`WebSocket`]s without a negotiated subprotocol.
    pub fn pair() -> (Self, Self) {
        Self::fakes("")
    }

    /// Every event this end has sent to its peer, Close included, in order.
    pub fn sent_events(&self) -> Vec<Event> {
        self.inner.sent.lock().clone()
    }

    /// Every event the peer has sent to this end, in order.
    ///
    /// Empty once the peer has been dropped.
    pub fn received_events(&self) -> Vec<Event> {
        self.peer()
            .map(|peer| peer.sent.lock().clone())
            .unwrap_or_default()
    }

    fn peer(&self) -> Option<Arc<FakeInner>> {
        self.inner.other.value().upgrade()
    }

    fn send(&self, event: Event) {
        let peer = match self.peer() {
            Some(peer) if !peer.core.is_closed() => peer,
            _ => return,
        };
        // recorded in the same step as the closed check, so the log never
        // shows anything after this end's Close
        let accepted = self.inner.core.with_state(|state| {
            if state.closed {
                return false;
            }
            self.inner.sent.lock().push(event.clone());
            true
        });
        if accepted {
            peer.core.deliver(event);
        }
    }
}

impl WebSocket for FakeWebSocket {
    fn send_text(&self, text: String) {
        self.send(Event::Text(text));
    }

    fn send_binary(&self, data: Vec<u8>) {
        self.send(Event::Binary(data));
    }

    fn close_with(&self, code: Option<CloseCode>, reason: Option<&str>) {
        if self.inner.core.is_closed() {
            return;
        }
        check_close_arguments(code, reason);
        let event = Event::Close {
            code: Some(code.unwrap_or(CloseCode::NO_STATUS_RECEIVED)),
            reason: reason.unwrap_or_default().into(),
        };
        // closing this end first means anything the peer sends back while
        // handling the Close is dropped
        let recorded = event.clone();
        let sent = &self.inner.sent;
        if !self
            .inner
            .core
            .deliver_then(event.clone(), move || sent.lock().push(recorded))
        {
            return;
        }
        trace!(?event, "fake websocket closed");
        if let Some(peer) = self.peer() {
            peer.core.deliver(event);
        }
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

impl Debug for FakeWebSocket {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.debug_struct("FakeWebSocket")
            .field("protocol", &self.inner.protocol)
            .field("state", &self.inner.core)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use futures::StreamExt;
    use parking_lot::Mutex;

    use super::FakeWebSocket;
    use crate::{CloseCode, Event, WebSocket};

    fn record(ws: &FakeWebSocket) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ws.listen(Arc::new(move |event: Event| sink.lock().push(event)));
        seen
    }

    #[test]
    fn sends_in_both_directions() {
        let (client, server) = FakeWebSocket::pair();
        let client_seen = record(&client);
        let server_seen = record(&server);

        client.send_text("ping".into());
        server.send_text("pong".into());
        server.send_binary(vec![1, 2, 3]);

        assert_eq!(*server_seen.lock(), vec![Event::Text("ping".into())]);
        assert_eq!(
            *client_seen.lock(),
            vec![Event::Text("pong".into()), Event::Binary(vec![1, 2, 3])]
        );
        assert_eq!(client.received_events(), server.sent_events());
    }

    #[test]
    fn local_close_notifies_both_ends() {
        let (client, server) = FakeWebSocket::pair();
        let client_seen = record(&client);
        let server_seen = record(&server);

        client.close_with(Some(CloseCode::NORMAL_CLOSURE), Some("bye"));

        let expected = Event::Close {
            code: Some(CloseCode::NORMAL_CLOSURE),
            reason: "bye".into(),
        };
        assert_eq!(*client_seen.lock(), vec![expected.clone()]);
        assert_eq!(*server_seen.lock(), vec![expected.clone()]);
        assert_eq!(client.sent_events(), vec![expected]);
        assert!(server.is_closed());
        assert_eq!(server.close_code(), Some(CloseCode::NORMAL_CLOSURE));
    }

    #[test]
    fn replies_to_a_closed_peer_are_dropped() {
        let (client, server) = FakeWebSocket::pair();
        let client_seen = record(&client);
        let replier = server.clone();
        server.listen(Arc::new(move |event: Event| {
            if event.is_close() {
                replier.send_text("too late".into());
            }
        }));

        client.close();

        assert_eq!(client_seen.lock().len(), 1);
        assert!(server.sent_events().is_empty());
    }

    #[test]
    fn observer_can_echo_synchronously() {
        let (client, server) = FakeWebSocket::pair();
        let client_seen = record(&client);
        let echo = server.clone();
        server.listen(Arc::new(move |event: Event| {
            if let Event::Text(text) = event {
                echo.send_text(text);
            }
        }));

        client.send_text("a".into());
        client.send_text("b".into());

        assert_eq!(
            *client_seen.lock(),
            vec![Event::Text("a".into()), Event::Text("b".into())]
        );
    }

    #[test]
    fn dropped_peer_is_treated_as_closed() {
        let (client, server) = FakeWebSocket::fakes("chat");
        let weak = Arc::downgrade(&server.inner);
        drop(server);
        assert!(weak.upgrade().is_none());

        client.send_text("nobody".into());
        assert!(client.sent_events().is_empty());
        assert!(client.received_events().is_empty());

        // closing still works and is recorded locally
        client.close();
        assert!(client.is_closed());
        assert_eq!(client.close_code(), Some(CloseCode::NO_STATUS_RECEIVED));
        assert_eq!(client.protocol(), "chat");
    }

    #[test]
    fn pair_does_not_leak() {
        let (client, server) = FakeWebSocket::pair();
        let client_weak = Arc::downgrade(&client.inner);
        let server_weak = Arc::downgrade(&server.inner);
        drop(client);
        drop(server);
        assert!(client_weak.upgrade().is_none());
        assert!(server_weak.upgrade().is_none());
    }

    #[test]
    #[should_panic(expected = "close code must be 1000 or in the range 3000-4999")]
    fn close_with_reserved_code_panics() {
        let (client, _server) = FakeWebSocket::pair();
        client.close_with(Some(CloseCode::ABNORMAL_CLOSURE), None);
    }

    #[test]
    fn close_after_close_skips_argument_checks() {
        let (client, server) = FakeWebSocket::pair();
        client.close();
        // later calls do nothing, even with arguments that would be rejected
        client.close_with(Some(CloseCode::GOING_AWAY), Some(&"x".repeat(200)));
        server.close_with(Some(CloseCode::ABNORMAL_CLOSURE), None);
        assert_eq!(client.close_code(), Some(CloseCode::NO_STATUS_RECEIVED));
        assert_eq!(client.sent_events().len(), 1);
    }

    /// Parses the "{sender}-{index}" texts sent by `concurrent_sends_and_close`.
    fn sender_and_index(text: &str) -> (usize, usize) {
        let mut parts = text.split('-');
        let sender = parts.next().unwrap().parse().unwrap();
        let index = parts.next().unwrap().parse().unwrap();
        (sender, index)
    }

    fn assert_close_is_last(events: &[Event], senders: usize) {
        let closes = events.iter().filter(|e| e.is_close()).count();
        assert_eq!(closes, 1, "{:?}", events);
        assert!(events.last().unwrap().is_close(), "{:?}", events);

        let mut next = vec![0; senders];
        for event in &events[..events.len() - 1] {
            let (sender, index) = sender_and_index(event.as_text().unwrap());
            assert!(index >= next[sender], "out of order: {:?}", events);
            next[sender] = index + 1;
        }
    }

    #[test]
    fn concurrent_sends_and_close() {
        const SENDERS: usize = 2;
        const MESSAGES: usize = 50;

        for _ in 0..500 {
            let (client, server) = FakeWebSocket::pair();
            let seen = record(&server);
            let barrier = Arc::new(Barrier::new(SENDERS + 1));

            let handles: Vec<_> = (0..SENDERS)
                .map(|sender| {
                    let client = client.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        for index in 0..MESSAGES {
                            client.send_text(format!("{}-{}", sender, index));
                        }
                    })
                })
                .collect();
            barrier.wait();
            client.close();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_close_is_last(&seen.lock(), SENDERS);
            assert_close_is_last(&client.sent_events(), SENDERS);
        }
    }

    #[tokio::test]
    async fn events_stream_ends_after_close() {
        let (client, server) = FakeWebSocket::pair();
        let events = server.events();

        client.send_text("one".into());
        client.send_binary(b"two".to_vec());
        client.close_with(CloseCode::new(4000), Some("done"));
        client.send_text("ignored".into());

        let events: Vec<Event> = events.collect().await;
        assert_eq!(
            events,
            vec![
                Event::Text("one".into()),
                Event::Binary(b"two".to_vec()),
                Event::Close {
                    code: CloseCode::new(4000),
                    reason: "done".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn local_close_ends_own_events_stream() {
        let (client, _server) = FakeWebSocket::pair();
        let events = client.events();
        client.close();
        let events: Vec<Event> = events.collect().await;
        assert_eq!(
            events,
            vec![Event::Close {
                code: Some(CloseCode::NO_STATUS_RECEIVED),
                reason: String::new(),
            }]
        );
    }

    #[tokio::test]
    async fn dropping_events_stream_detaches_without_closing() {
        let (client, server) = FakeWebSocket::pair();
        let events = server.events();
        drop(events);

        client.send_text("still open".into());
        assert!(!server.is_closed());
        assert!(!client.is_closed());
        assert_eq!(server.received_events(), vec![Event::Text("still open".into())]);
    }

    #[tokio::test]
    async fn replacing_observer_ends_previous_stream() {
        let (client, server) = FakeWebSocket::pair();
        let mut first = server.events();
        client.send_text("for first".into());
        let second = server.events();
        client.send_text("for second".into());

        assert_eq!(first.next().await, Some(Event::Text("for first".into())));
        assert_eq!(first.next().await, None);

        // cancelling the stale stream leaves the new one attached
        drop(first);
        client.close();
        let rest: Vec<Event> = second.collect().await;
        assert_eq!(rest.len(), 2);
        assert!(rest[1].is_close());
    }
}
