//! Edge: a bounded, ordered, typed channel between exactly one upstream
//! producer and one downstream consumer (§3, §5).
//!
//! Edges carry a `Barrier` marker used for windowing and checkpoint
//! alignment alongside the ordinary payload messages. Backpressure comes
//! for free from the bounded `tokio::sync::mpsc` channel: `send` blocks
//! (awaits) when the channel is full.

use tokio::sync::mpsc;

/// Default edge buffer capacity (§4.1: "Edges are bounded (default 1000
/// messages)").
pub const DEFAULT_EDGE_CAPACITY: usize = 1000;

/// One message traveling along an edge.
#[derive(Debug, Clone)]
pub enum EdgeMessage<T> {
    Data(T),
    /// Alignment marker for windowing/checkpointing; carries the watermark
    /// nanosecond timestamp that is now safe to consider closed.
    Barrier(i64),
}

/// The producer half of an edge.
#[derive(Debug, Clone)]
pub struct EdgeSender<T> {
    inner: mpsc::Sender<EdgeMessage<T>>,
}

/// The consumer half of an edge.
#[derive(Debug)]
pub struct EdgeReceiver<T> {
    inner: mpsc::Receiver<EdgeMessage<T>>,
}

impl<T> EdgeSender<T> {
    /// Send a data message, blocking (awaiting) if the edge is at capacity.
    pub async fn send(&self, value: T) -> Result<(), SendError> {
        self.inner
            .send(EdgeMessage::Data(value))
            .await
            .map_err(|_| SendError::Closed)
    }

    pub async fn send_barrier(&self, watermark: i64) -> Result<(), SendError> {
        self.inner
            .send(EdgeMessage::Barrier(watermark))
            .await
            .map_err(|_| SendError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> EdgeReceiver<T> {
    /// Receive the next message. `None` means the edge is drained and
    /// closed: every worker must check for this at its receive point,
    /// flush in-flight state, close its outputs, and exit (§5).
    pub async fn recv(&mut self) -> Option<EdgeMessage<T>> {
        self.inner.recv().await
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("edge closed")]
    Closed,
}

/// Construct a bounded edge with the given capacity.
pub fn edge<T>(capacity: usize) -> (EdgeSender<T>, EdgeReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EdgeSender { inner: tx }, EdgeReceiver { inner: rx })
}

/// Construct a bounded edge with the default capacity.
pub fn default_edge<T>() -> (EdgeSender<T>, EdgeReceiver<T>) {
    edge(DEFAULT_EDGE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_are_delivered_in_order() {
        let (tx, mut rx) = edge::<i32>(4);
        for i in 0..4 {
            tx.send(i).await.unwrap();
        }
        drop(tx);
        let mut seen = Vec::new();
        while let Some(EdgeMessage::Data(v)) = rx.recv().await {
            seen.push(v);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn receiver_observes_close_after_drain() {
        let (tx, mut rx) = edge::<i32>(2);
        tx.send(1).await.unwrap();
        drop(tx);
        assert!(matches!(rx.recv().await, Some(EdgeMessage::Data(1))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn barrier_carries_watermark() {
        let (tx, mut rx) = edge::<i32>(2);
        tx.send_barrier(42).await.unwrap();
        match rx.recv().await {
            Some(EdgeMessage::Barrier(w)) => assert_eq!(w, 42),
            other => panic!("expected barrier, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_after_close_errors() {
        let (tx, rx) = edge::<i32>(1);
        drop(rx);
        assert_eq!(tx.send(1).await, Err(SendError::Closed));
    }
}
