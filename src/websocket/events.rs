use std::fmt::{Debug, Error as FmtError, Formatter};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};

use super::event::Event;
use super::ObservationToken;
#[allow(unused_imports)] // for intra doc links
use super::WebSocket;

/// A stream of the [`Event`]s received by a connection, created by [`WebSocket::events()`].
///
/// The stream installs itself as the connection's observer. It yields every
/// event delivered after that point and ends right after yielding a
/// [`Close`](Event::Close) event. If another observer replaces it, the stream
/// ends once the events already queued have been yielded.
///
/// Dropping the stream detaches it from the connection without closing the
/// connection; use [`WebSocket::close()`] for that.
pub struct Events {
    receiver: BoxStream<'static, Event>,
    token: Option<ObservationToken>,
    finished: bool,
}

impl Events {
    pub(super) fn new(receiver: flume::Receiver<Event>, token: ObservationToken) -> Self {
        Self {
            receiver: receiver.into_stream().boxed(),
            token: Some(token),
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

impl Stream for Events {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_close() {
                    self.finish();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Events {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

impl Debug for Events {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.debug_struct("Events")
            .field("finished", &self.finished)
            .finish()
    }
}
