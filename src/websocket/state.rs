use std::collections::VecDeque;
use std::fmt::{Debug, Error as FmtError, Formatter};
use std::mem;
use std::sync::Arc;

use tracing::trace;

use super::event::{CloseCode, Event, MAX_CLOSE_REASON_LEN};
use super::{EventHandler, ObservationToken};
use crate::lock_isolated::LockIsolated;

#[derive(Clone)]
struct Observer {
    id: u64,
    handler: EventHandler,
}

/// Mutable state shared by every connection implementation.
#[derive(Clone, Default)]
pub(crate) struct ConnectionState {
    pub(crate) closed: bool,
    /// A local close has been handed to the transport but not yet answered.
    pub(crate) close_requested: bool,
    pub(crate) close_code: Option<CloseCode>,
    pub(crate) close_reason: Option<String>,
    observer: Option<Observer>,
    next_observer_id: u64,
    /// Accepted events not yet handed to the observer.
    pending: VecDeque<Event>,
    /// Some thread is handing `pending` to the observer.
    draining: bool,
}

impl Debug for ConnectionState {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.debug_struct("ConnectionState")
            .field("closed", &self.closed)
            .field("close_requested", &self.close_requested)
            .field("close_code", &self.close_code)
            .field("close_reason", &self.close_reason)
            .field("observer", &self.observer.as_ref().map(|o| o.id))
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// The closing state machine and observer slot of one connection.
///
/// Observers are always invoked after the state lock has been released, so a
/// handler may freely call back into the connection (or its peer).
///
/// Accepted events go through a queue with a single drainer: the thread that
/// finds no drain running hands events to the observer one at a time, in the
/// order they were accepted, while other callers only enqueue. The observer is
/// therefore never called concurrently and never sees anything after Close.
#[derive(Debug, Default)]
pub(crate) struct ConnectionCore {
    state: LockIsolated<ConnectionState>,
}

impl ConnectionCore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_state<R>(&self, body: impl FnOnce(&mut ConnectionState) -> R) -> R {
        self.state.with_value(body)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.with_value(|state| state.closed)
    }

    pub(crate) fn close_code(&self) -> Option<CloseCode> {
        self.state.with_value(|state| state.close_code)
    }

    pub(crate) fn close_reason(&self) -> Option<String> {
        self.state.with_value(|state| state.close_reason.clone())
    }

    /// Installs `handler` as the only observer, replacing any previous one.
    ///
    /// A closed connection never delivers again, so nothing is installed and
    /// `handler` is dropped right away.
    pub(crate) fn listen(self: &Arc<Self>, handler: EventHandler) -> ObservationToken {
        let id = self.state.with_value(move |state| {
            if state.closed {
                return None;
            }
            state.next_observer_id += 1;
            let id = state.next_observer_id;
            state.observer = Some(Observer { id, handler });
            Some(id)
        });
        match id {
            Some(id) => {
                let core = Arc::downgrade(self);
                ObservationToken::new(move || {
                    if let Some(core) = core.upgrade() {
                        core.unlisten(id);
                    }
                })
            }
            None => ObservationToken::inert(),
        }
    }

    fn unlisten(&self, id: u64) {
        self.state.with_value(|state| {
            if state.observer.as_ref().map(|o| o.id) == Some(id) {
                state.observer = None;
            }
        });
    }

    /// Delivers `event` to the current observer.
    ///
    /// Returns false without delivering if the connection is already closed.
    /// A Close event closes the connection and records its code and reason in
    /// the same step that accepts it, so at most one Close is ever accepted.
    ///
    /// Unless another call is already draining (on this thread or another),
    /// the event has reached the observer when this returns.
    pub(crate) fn deliver(&self, event: Event) -> bool {
        self.deliver_then(event, || ())
    }

    /// Like [`deliver()`](Self::deliver()), also running `on_accept` in the
    /// step that accepts the event.
    pub(crate) fn deliver_then(&self, event: Event, on_accept: impl FnOnce()) -> bool {
        let drain = self.state.with_value(|state| {
            if state.closed {
                return None;
            }
            if let Event::Close { code, reason } = &event {
                state.closed = true;
                state.close_code = *code;
                state.close_reason = Some(reason.clone());
            }
            on_accept();
            state.pending.push_back(event);
            Some(!mem::replace(&mut state.draining, true))
        });
        match drain {
            Some(true) => {
                self.drain();
                true
            }
            Some(false) => true,
            None => false,
        }
    }

    fn drain(&self) {
        let mut guard = DrainGuard {
            core: self,
            finished: false,
        };
        loop {
            let next = self.state.with_value(|state| match state.pending.pop_front() {
                Some(event) => {
                    let handler = state.observer.as_ref().map(|o| Arc::clone(&o.handler));
                    if event.is_close() {
                        state.observer = None;
                    }
                    Some((event, handler))
                }
                None => {
                    state.draining = false;
                    None
                }
            });
            match next {
                Some((event, Some(handler))) => handler(event),
                Some((event, None)) => trace!(?event, "no observer attached, event dropped"),
                None => break,
            }
        }
        guard.finished = true;
    }
}

/// Releases the drain if an observer panics, so later events are not stuck.
struct DrainGuard<'a> {
    core: &'a ConnectionCore,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.core.state.with_value(|state| state.draining = false);
        }
    }
}

/// Panics unless `code` and `reason` may be used for a local close.
pub(crate) fn check_close_arguments(code: Option<CloseCode>, reason: Option<&str>) {
    if let Some(code) = code {
        assert!(
            code.is_sendable(),
            "invalid argument: {}, close code must be 1000 or in the range 3000-4999",
            code
        );
    }
    if let Some(reason) = reason {
        assert!(
            reason.len() <= MAX_CLOSE_REASON_LEN,
            "reason must be <= {} bytes long and encoded as UTF-8",
            MAX_CLOSE_REASON_LEN
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use parking_lot::Mutex;

    use super::{check_close_arguments, ConnectionCore};
    use crate::websocket::event::{CloseCode, Event};

    fn recorder() -> (Arc<Mutex<Vec<Event>>>, crate::EventHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Arc::new(move |event: Event| sink.lock().push(event)))
    }

    fn close(code: u16, reason: &str) -> Event {
        Event::Close {
            code: CloseCode::new(code),
            reason: reason.into(),
        }
    }

    #[test]
    fn only_first_close_is_delivered() {
        let core = ConnectionCore::new();
        let (seen, handler) = recorder();
        core.listen(handler);

        assert!(core.deliver(Event::Text("a".into())));
        assert!(core.deliver(close(1000, "first")));
        assert!(!core.deliver(close(3000, "second")));
        assert!(!core.deliver(Event::Text("late".into())));

        assert_eq!(
            *seen.lock(),
            vec![Event::Text("a".into()), close(1000, "first")]
        );
        assert!(core.is_closed());
        assert_eq!(core.close_code(), Some(CloseCode::NORMAL_CLOSURE));
        assert_eq!(core.close_reason().as_deref(), Some("first"));
    }

    #[test]
    fn new_observer_replaces_previous() {
        let core = ConnectionCore::new();
        let (first, first_handler) = recorder();
        let (second, second_handler) = recorder();
        let first_token = core.listen(first_handler);
        core.deliver(Event::Text("one".into()));
        core.listen(second_handler);
        core.deliver(Event::Text("two".into()));

        // a stale token must not detach the newer observer
        first_token.cancel();
        core.deliver(Event::Text("three".into()));

        assert_eq!(*first.lock(), vec![Event::Text("one".into())]);
        assert_eq!(
            *second.lock(),
            vec![Event::Text("two".into()), Event::Text("three".into())]
        );
    }

    #[test]
    fn cancelled_observer_stops_receiving() {
        let core = ConnectionCore::new();
        let (seen, handler) = recorder();
        core.listen(handler).cancel();
        core.deliver(Event::Text("ignored".into()));
        assert!(seen.lock().is_empty());
        assert!(!core.is_closed());
    }

    #[test]
    fn observer_may_reenter_connection() {
        let core = ConnectionCore::new();
        let inner = Arc::clone(&core);
        core.listen(Arc::new(move |event: Event| {
            if event.as_text() == Some("stop") {
                inner.deliver(close(1000, "stopped"));
            }
        }));
        core.deliver(Event::Text("stop".into()));
        assert!(core.is_closed());
        assert_eq!(core.close_reason().as_deref(), Some("stopped"));
    }

    #[test]
    fn nothing_is_observed_after_close_under_contention() {
        const THREADS: usize = 4;
        const EVENTS: usize = 100;

        for _ in 0..200 {
            let core = ConnectionCore::new();
            let (seen, handler) = recorder();
            core.listen(handler);
            let barrier = Arc::new(Barrier::new(THREADS + 1));

            let handles: Vec<_> = (0..THREADS)
                .map(|sender| {
                    let core = Arc::clone(&core);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        for index in 0..EVENTS {
                            core.deliver(Event::Binary(vec![sender as u8, index as u8]));
                        }
                    })
                })
                .collect();
            barrier.wait();
            let closed_here = core.deliver(close(1000, "done"));
            for handle in handles {
                handle.join().unwrap();
            }

            assert!(closed_here);
            let seen = seen.lock();
            assert_eq!(seen.iter().filter(|e| e.is_close()).count(), 1);
            assert!(seen.last().unwrap().is_close());
            let mut next = [0_u8; THREADS];
            for event in &seen[..seen.len() - 1] {
                let data = event.as_binary().unwrap();
                let (sender, index) = (data[0] as usize, data[1]);
                assert!(index >= next[sender], "out of order: {:?}", *seen);
                next[sender] = index + 1;
            }
        }
    }

    #[test]
    fn panicking_observer_does_not_stall_delivery() {
        let core = ConnectionCore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        core.listen(Arc::new(move |event: Event| {
            if event.as_text() == Some("boom") {
                panic!("observer failed");
            }
            sink.lock().push(event);
        }));

        let inner = Arc::clone(&core);
        let result = thread::spawn(move || inner.deliver(Event::Text("boom".into()))).join();
        assert!(result.is_err());

        assert!(core.deliver(Event::Text("after".into())));
        assert_eq!(*seen.lock(), vec![Event::Text("after".into())]);
    }

    #[test]
    fn listening_on_closed_connection_installs_nothing() {
        let core = ConnectionCore::new();
        core.deliver(close(1000, ""));
        let (seen, handler) = recorder();
        core.listen(handler);
        assert!(!core.deliver(Event::Text("x".into())));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn accepts_valid_close_arguments() {
        check_close_arguments(None, None);
        check_close_arguments(Some(CloseCode::NORMAL_CLOSURE), Some("bye"));
        check_close_arguments(CloseCode::new(4999), Some(&"x".repeat(123)));
    }

    #[test]
    #[should_panic(expected = "close code must be 1000 or in the range 3000-4999")]
    fn rejects_reserved_close_code() {
        check_close_arguments(Some(CloseCode::GOING_AWAY), None);
    }

    #[test]
    #[should_panic(expected = "reason must be <= 123 bytes")]
    fn rejects_long_reason() {
        // 62 two-byte characters, 124 bytes
        check_close_arguments(None, Some(&"é".repeat(62)));
    }
}
