//! Streaming Module
//!
//! Provides the decode side and the delivery side of a session:
//! - Incremental reassembly of objects from upstream byte streams
//! - Extraction of text and inline attachments from decoded objects
//! - Session events and their SSE wire format
//! - Event sinks draining a session's event channel
//!

pub mod accumulator;
pub mod event;
pub mod extractor;
pub mod sink;
pub mod sse;

// Re-exports
pub use accumulator::{AccumulatorStats, ChunkAccumulator, DecodedObject};
pub use event::{image_url, Event, TaskId, IMAGE_URL_PREFIX};
pub use extractor::{AttachmentCandidate, EmbeddedError, Extraction, ObjectExtractor};
pub use sink::{event_channel, pump, EventReceiver, EventSender, EventSink, SinkError, WireSink};
pub use sse::encode_frame;
