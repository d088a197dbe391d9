//! Event Sink
//!
//! A session's producers (upstream tasks and persistence operations) push
//! events into one unbounded channel; a single consumer drains it into an
//! `EventSink`. The sink writes in receipt order and never reorders.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::event::Event;

/// Sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The consumer behind the sink has gone away
    #[error("Sink closed")]
    Closed,
}

/// Destination of a session's event stream
#[async_trait]
pub trait EventSink: Send {
    /// Write one event
    async fn emit(&mut self, event: &Event) -> Result<(), SinkError>;

    /// Flush and terminate the stream
    async fn close(&mut self) -> Result<(), SinkError>;

    /// Resolves once the consumer behind the sink is gone.
    ///
    /// Sinks that cannot observe their consumer never resolve.
    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }
}

/// Producer handle for a session's event channel
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

/// Consumer end of a session's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create a session event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    /// Queue an event. Returns `false` once the consumer is gone.
    ///
    /// Never blocks, so it is safe to call while holding a lock.
    pub fn emit(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the consumer has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer has dropped its receiver
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Drain `events` into `sink` until the terminal event, then close it.
///
/// Returns the number of events written. If the channel ends without a
/// terminal event the sink is still closed. If the sink's consumer goes
/// away while waiting for the next event, returns `SinkError::Closed` and
/// drops `events` at once so producers observe the disconnect.
pub async fn pump<S>(mut events: EventReceiver, sink: &mut S) -> Result<usize, SinkError>
where
    S: EventSink + ?Sized,
{
    let mut written = 0;
    loop {
        let next = tokio::select! {
            event = events.recv() => Some(event),
            _ = sink.closed() => None,
        };
        let Some(next) = next else {
            return Err(SinkError::Closed);
        };
        let Some(event) = next else {
            break;
        };
        sink.emit(&event).await?;
        written += 1;
        if event.is_terminal() {
            break;
        }
    }
    sink.close().await?;
    Ok(written)
}

/// Writes events in `text/event-stream` format to any async writer
pub struct WireSink<W> {
    writer: W,
    closed: bool,
}

impl<W> WireSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> EventSink for WireSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&mut self, event: &Event) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.writer.write_all(event.to_wire().as_bytes()).await?;
        // each frame must reach the client as soon as it is produced
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if !self.closed {
            self.closed = true;
            self.writer.shutdown().await?;
        }
        Ok(())
    }
}
