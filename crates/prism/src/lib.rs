//! Prism - fan-out generation with streaming aggregation
//!
//! This crate fans a prompt out to several concurrent upstream generation
//! requests, decodes their raw byte streams into text and image events,
//! persists images to a content-addressed store and forwards one ordered
//! event stream to the consumer.

pub mod background;
pub mod config;
pub mod media;
pub mod network;
pub mod orchestrator;
pub mod providers;
pub mod store;
pub mod streaming;

pub use background::PersistenceTracker;
pub use config::{ConfigError, PrismConfig};
pub use orchestrator::{FanOutOrchestrator, GenerationRequest, SessionReport};
pub use providers::{GeminiProvider, GenerationProvider};
pub use store::AttachmentStore;
pub use streaming::{ChunkAccumulator, Event, EventSink, ObjectExtractor};
