//! Single-producer, single-consumer conduit between an invocation worker and
//! the stream that drains it.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::{Outcome, StreamItem};

const DROPPED_REASON: &str = "token producer dropped before completion";

/// Result of a single [`TokenConsumer::pop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop {
    Item(StreamItem),
    /// Nothing arrived within the timeout. Not an error and not end of stream.
    Empty,
    /// Every producer is gone and the queue is drained.
    Closed,
}

pub struct TokenChannel;

impl TokenChannel {
    /// Open a fresh channel for one request.
    pub fn open() -> (TokenProducer, TokenConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TokenProducer {
                sink: TokenSink { tx, ended: false },
            },
            TokenConsumer { rx },
        )
    }
}

/// Restricted producer handle handed to a [`crate::application::Completer`].
/// It can push tokens and trace records but never the terminal marker.
pub struct TokenSink {
    tx: mpsc::UnboundedSender<StreamItem>,
    ended: bool,
}

impl TokenSink {
    pub fn token(&mut self, token: impl Into<String>) {
        self.send(StreamItem::Token(token.into()));
    }

    pub fn trace(&mut self, run_id: impl Into<String>) {
        self.send(StreamItem::Trace(run_id.into()));
    }

    /// Whether the consumer has gone away. Pushes still succeed, they are
    /// simply discarded.
    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&mut self, item: StreamItem) {
        if self.ended {
            trace!("Discarding {:?} pushed after end of stream", item);
            return;
        }
        if item.is_end() {
            self.ended = true;
        }
        if let Err(e) = self.tx.send(item) {
            trace!("Token consumer gone, discarding {:?}", e.0);
        }
    }
}

/// Owning producer side. Pushes exactly one `End`: either explicitly through
/// [`TokenProducer::finish`] or a failure on drop.
pub struct TokenProducer {
    sink: TokenSink,
}

impl TokenProducer {
    /// Non-blocking enqueue. Pushing an `End` closes the producer; anything
    /// pushed afterwards is discarded.
    pub fn push(&mut self, item: StreamItem) {
        self.sink.send(item);
    }

    pub fn sink(&mut self) -> &mut TokenSink {
        &mut self.sink
    }

    pub fn is_ended(&self) -> bool {
        self.sink.ended
    }

    pub fn finish(mut self, outcome: Outcome) {
        self.push(StreamItem::End(outcome));
    }
}

impl Drop for TokenProducer {
    fn drop(&mut self) {
        if !self.sink.ended {
            self.sink.send(StreamItem::End(Outcome::failed(DROPPED_REASON)));
        }
    }
}

pub struct TokenConsumer {
    rx: mpsc::UnboundedReceiver<StreamItem>,
}

impl TokenConsumer {
    /// Wait up to `timeout` for the next item.
    pub async fn pop(&mut self, timeout: Duration) -> Pop {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(item)) => Pop::Item(item),
            Ok(None) => Pop::Closed,
            Err(_) => Pop::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_fifo_order_then_end() {
        let (mut producer, mut consumer) = TokenChannel::open();
        producer.push(StreamItem::Token("a".to_string()));
        producer.sink().token("b");
        producer.finish(Outcome::Completed);

        assert_eq!(consumer.pop(POLL).await, Pop::Item(StreamItem::Token("a".to_string())));
        assert_eq!(consumer.pop(POLL).await, Pop::Item(StreamItem::Token("b".to_string())));
        assert_eq!(consumer.pop(POLL).await, Pop::Item(StreamItem::End(Outcome::Completed)));
        assert_eq!(consumer.pop(POLL).await, Pop::Closed);
    }

    #[tokio::test]
    async fn test_nothing_is_enqueued_after_end() {
        let (mut producer, mut consumer) = TokenChannel::open();
        producer.push(StreamItem::End(Outcome::Completed));
        producer.push(StreamItem::Token("late".to_string()));
        producer.sink().trace("late-run");
        assert!(producer.is_ended());
        drop(producer);

        assert_eq!(consumer.pop(POLL).await, Pop::Item(StreamItem::End(Outcome::Completed)));
        assert_eq!(consumer.pop(POLL).await, Pop::Closed);
    }

    #[tokio::test]
    async fn test_drop_without_finish_pushes_failure() {
        let (mut producer, mut consumer) = TokenChannel::open();
        producer.sink().token("partial");
        drop(producer);

        assert_eq!(
            consumer.pop(POLL).await,
            Pop::Item(StreamItem::Token("partial".to_string()))
        );
        assert_eq!(
            consumer.pop(POLL).await,
            Pop::Item(StreamItem::End(Outcome::failed(DROPPED_REASON)))
        );
        assert_eq!(consumer.pop(POLL).await, Pop::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_polls_until_item_arrives() {
        let (mut producer, mut consumer) = TokenChannel::open();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            producer.sink().token("late");
            producer.finish(Outcome::Completed);
        });

        let mut empties = 0;
        let first = loop {
            match consumer.pop(POLL).await {
                Pop::Empty => empties += 1,
                other => break other,
            }
        };

        assert_eq!(empties, 3);
        assert_eq!(first, Pop::Item(StreamItem::Token("late".to_string())));
        assert_eq!(consumer.pop(POLL).await, Pop::Item(StreamItem::End(Outcome::Completed)));
    }

    #[tokio::test]
    async fn test_push_after_consumer_dropped_is_silent() {
        let (mut producer, consumer) = TokenChannel::open();
        drop(consumer);
        assert!(producer.sink().is_detached());
        producer.sink().token("nobody listening");
        producer.finish(Outcome::Completed);
    }
}
