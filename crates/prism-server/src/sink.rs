//! SSE sink
//!
//! Bridges a session's event channel onto an axum SSE response body.

use async_trait::async_trait;
use axum::response::sse;
use prism::streaming::{Event, EventSink, SinkError};
use std::convert::Infallible;
use tokio::sync::mpsc;

pub type SseItem = Result<sse::Event, Infallible>;

/// Forwards session events to the HTTP response stream
pub struct SseChannelSink {
    tx: Option<mpsc::Sender<SseItem>>,
}

impl SseChannelSink {
    pub fn new(tx: mpsc::Sender<SseItem>) -> Self {
        Self { tx: Some(tx) }
    }
}

/// Map a session event onto an SSE frame
pub fn to_sse_event(event: &Event) -> sse::Event {
    sse::Event::default()
        .event(event.name())
        .data(event.data().to_string())
}

#[async_trait]
impl EventSink for SseChannelSink {
    async fn emit(&mut self, event: &Event) -> Result<(), SinkError> {
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;
        tx.send(Ok(to_sse_event(event)))
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        // dropping the sender ends the response body
        self.tx.take();
        Ok(())
    }

    async fn closed(&mut self) {
        match &self.tx {
            // the response body (and its receiver) is dropped on disconnect
            Some(tx) => tx.closed().await,
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_emit_forwards_until_closed() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = SseChannelSink::new(tx);

        sink.emit(&Event::AttachmentBatch { count: 2 }).await.unwrap();
        assert!(rx.recv().await.is_some());

        sink.close().await.unwrap();
        assert!(rx.recv().await.is_none());
        assert!(matches!(
            sink.emit(&Event::AttachmentBatch { count: 0 }).await,
            Err(SinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_closed_resolves_when_client_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let mut sink = SseChannelSink::new(tx);

        let pending = tokio::time::timeout(Duration::from_millis(50), sink.closed()).await;
        assert!(pending.is_err());

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), sink.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_emit_fails_when_client_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let mut sink = SseChannelSink::new(tx);
        drop(rx);

        assert!(matches!(
            sink.emit(&Event::AttachmentBatch { count: 1 }).await,
            Err(SinkError::Closed)
        ));
    }
}
