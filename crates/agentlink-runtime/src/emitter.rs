//! Broadcast-based event emitter for one agent.

use std::sync::atomic::{AtomicU64, Ordering};

use agentlink_core::{AgentError, AgentEvent, AgentEventEnvelope, AgentEventStream};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;

/// Default broadcast channel capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast-based event emitter.
///
/// Non-blocking: `emit` never awaits. A subscriber that falls more than the
/// channel capacity behind sees a lag error and its stream ends.
pub struct EventEmitter {
    tx: broadcast::Sender<AgentEventEnvelope>,
    emit_count: AtomicU64,
}

enum Step {
    Event(AgentEventEnvelope),
    Lagged(u64),
    Finished,
    Drain,
}

impl EventEmitter {
    /// Create a new emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers. Non-blocking.
    ///
    /// Returns the number of receivers that received the event.
    pub fn emit(&self, event: AgentEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event.into_envelope()).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the total number of events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }

    /// Subscribe now and expose the receiver as an [`AgentEventStream`].
    ///
    /// The stream ends when `cancel` fires, or when `closed` fires and every
    /// event already emitted has been yielded.
    pub fn stream(&self, cancel: CancellationToken, closed: CancellationToken) -> AgentEventStream {
        let mut rx = self.tx.subscribe();
        let stream = async_stream::stream! {
            loop {
                let step = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Step::Finished,
                    () = closed.cancelled() => Step::Drain,
                    received = rx.recv() => match received {
                        Ok(event) => Step::Event(event),
                        Err(RecvError::Lagged(n)) => Step::Lagged(n),
                        Err(RecvError::Closed) => Step::Finished,
                    },
                };
                match step {
                    Step::Event(event) => yield Ok(event),
                    Step::Lagged(n) => {
                        yield Err(AgentError::Lagged(n));
                        break;
                    }
                    Step::Finished => break,
                    Step::Drain => {
                        loop {
                            match rx.try_recv() {
                                Ok(event) => yield Ok(event),
                                Err(TryRecvError::Lagged(n)) => {
                                    yield Err(AgentError::Lagged(n));
                                    break;
                                }
                                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                            }
                        }
                        break;
                    }
                }
            }
        };
        stream.boxed()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(content: &str) -> AgentEvent {
        AgentEvent::OutputChat {
            content: content.into(),
        }
    }

    #[test]
    fn emit_with_no_subscribers() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit(chat("x")), 0);
        assert_eq!(emitter.emit_count(), 1);
    }

    #[tokio::test]
    async fn stream_sees_events_in_order() {
        let emitter = EventEmitter::new();
        let mut stream = emitter.stream(CancellationToken::new(), CancellationToken::new());

        let _ = emitter.emit(chat("one"));
        let _ = emitter.emit(chat("two"));

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.data["content"], "one");
        assert_eq!(second.data["content"], "two");
    }

    #[tokio::test]
    async fn subscription_is_established_on_call() {
        let emitter = EventEmitter::new();
        let stream = emitter.stream(CancellationToken::new(), CancellationToken::new());
        assert_eq!(emitter.subscriber_count(), 1);
        assert_eq!(emitter.emit(chat("early")), 1);
        drop(stream);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cancel_ends_stream() {
        let emitter = EventEmitter::new();
        let cancel = CancellationToken::new();
        let mut stream = emitter.stream(cancel.clone(), CancellationToken::new());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn close_drains_buffered_events_then_ends() {
        let emitter = EventEmitter::new();
        let closed = CancellationToken::new();
        let mut stream = emitter.stream(CancellationToken::new(), closed.clone());

        let _ = emitter.emit(chat("last words"));
        let _ = emitter.emit(AgentEvent::StateExit {});
        closed.cancel();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event_type, "output.chat");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.event_type, "state.exit");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_error() {
        let emitter = EventEmitter::with_capacity(2);
        let mut stream = emitter.stream(CancellationToken::new(), CancellationToken::new());

        for i in 0..5 {
            let _ = emitter.emit(chat(&i.to_string()));
        }

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::Lagged(3)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn lag_is_reported_while_draining_after_close() {
        let emitter = EventEmitter::with_capacity(2);
        let closed = CancellationToken::new();
        let mut stream = emitter.stream(CancellationToken::new(), closed.clone());

        for i in 0..5 {
            let _ = emitter.emit(chat(&i.to_string()));
        }
        closed.cancel();

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::Lagged(3)));
        assert!(stream.next().await.is_none());
    }
}
