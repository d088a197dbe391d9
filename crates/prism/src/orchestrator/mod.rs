//! Fan-out Orchestrator
//!
//! Runs one session: spawns N concurrent upstream tasks for a prompt, each
//! with its own accumulator and extractor, hands attachments to the store
//! as tracked operations, and emits `Complete` only after every task has
//! ended and every tracked operation has settled.
//!
//! Events from one task keep their order; events from different tasks
//! interleave freely.

mod session;
mod task;

pub use session::{Session, SessionReport, SessionStatus};
pub use task::{TaskHandle, TaskReport, TaskStatus, UpstreamTask};

use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::background::PersistenceTracker;
use crate::config::{validate_fan_out, ConfigError, FanOutConfig, PrismConfig};
use crate::network::TimeoutConfig;
use crate::providers::{GeminiProvider, GenerationProvider, Modality, UpstreamRequest};
use crate::store::AttachmentWriter;
use crate::streaming::{Event, EventSender, ObjectExtractor};
use task::{TaskContext, TaskOutcome};

/// Orchestrator errors
///
/// Only problems detected before any task starts surface here; everything
/// after that is reported through the event stream.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// A prompt to fan out
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    /// Overrides the configured fan-out degree
    #[serde(default)]
    pub fan_out: Option<usize>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub image_size: Option<String>,
    #[serde(default)]
    pub modality: Option<Modality>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = Some(fan_out);
        self
    }
}

/// Session defaults
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub fan_out: FanOutConfig,
    pub timeouts: TimeoutConfig,
    pub aspect_ratio: String,
    pub image_size: String,
    pub modality: Modality,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&PrismConfig::default())
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &PrismConfig) -> Self {
        Self {
            fan_out: config.fan_out.clone(),
            timeouts: config.timeouts.clone(),
            aspect_ratio: config.provider.aspect_ratio.clone(),
            image_size: config.provider.image_size.clone(),
            modality: config.provider.modality,
        }
    }
}

/// Runs sessions against a generation provider and an attachment writer
pub struct FanOutOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    writer: Arc<dyn AttachmentWriter>,
    options: OrchestratorOptions,
}

impl FanOutOrchestrator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        writer: Arc<dyn AttachmentWriter>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            provider,
            writer,
            options,
        }
    }

    /// Validate `config` and build an orchestrator on the Gemini provider
    pub fn from_config(
        config: &PrismConfig,
        writer: Arc<dyn AttachmentWriter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let provider = GeminiProvider::from_config(config)?;
        Ok(Self::new(
            Arc::new(provider),
            writer,
            OrchestratorOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Run one session, emitting its events into `events`.
    ///
    /// Fails only when the request is rejected before any task starts; in
    /// every other case the stream ends with exactly one `Complete`.
    pub async fn run(
        &self,
        request: GenerationRequest,
        events: EventSender,
    ) -> Result<SessionReport, OrchestratorError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(ConfigError::invalid_value("prompt", "must not be empty").into());
        }
        let fan_out = request.fan_out.unwrap_or(self.options.fan_out.degree);
        validate_fan_out(fan_out)?;

        let upstream = UpstreamRequest {
            prompt: prompt.to_string(),
            modality: request.modality.unwrap_or(self.options.modality),
            aspect_ratio: request
                .aspect_ratio
                .unwrap_or_else(|| self.options.aspect_ratio.clone()),
            image_size: request
                .image_size
                .unwrap_or_else(|| self.options.image_size.clone()),
        };

        let mut session = Session::new(upstream.prompt.clone(), fan_out);
        let span = info_span!("session", session_id = %session.id());
        let report = self.drive(&mut session, upstream, events).instrument(span).await;
        Ok(report)
    }

    async fn drive(
        &self,
        session: &mut Session,
        request: UpstreamRequest,
        events: EventSender,
    ) -> SessionReport {
        info!(
            fan_out = session.tasks().len(),
            provider = self.provider.name(),
            "session started"
        );
        events.emit(Event::Connected {
            session_id: session.id().to_string(),
        });

        let tracker = PersistenceTracker::new();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let events = events.clone();
            let cancel = cancel.clone();
            async move {
                events.closed().await;
                cancel.cancel();
            }
        });

        let ctx = Arc::new(TaskContext {
            provider: Arc::clone(&self.provider),
            writer: Arc::clone(&self.writer),
            tracker: tracker.clone(),
            events: events.clone(),
            extractor: ObjectExtractor::new().with_thoughts(self.options.fan_out.include_thoughts),
            request,
            forward_text: self.options.fan_out.forward_text,
            request_timeout_ms: self.options.timeouts.request_ms,
            cancel: cancel.clone(),
        });

        let running: Vec<_> = session
            .tasks()
            .iter()
            .map(|handle| {
                let task = UpstreamTask::new(handle.clone());
                let span = info_span!("task", task = handle.id());
                tokio::spawn(task.run(Arc::clone(&ctx)).instrument(span))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(running.len());
        for (id, joined) in join_all(running).await.into_iter().enumerate() {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(task = id, "task aborted: {}", e);
                    if let Some(handle) = session.task(id) {
                        handle.fail(format!("task aborted: {}", e), &events);
                    }
                    outcomes.push(TaskOutcome::default());
                }
            }
        }
        watcher.abort();

        debug!(pending = tracker.pending(), "all tasks ended, awaiting persistence");
        tracker.await_all().await;

        let persisted = tracker.stats();
        if persisted.failed > 0 {
            warn!(
                failed = persisted.failed,
                tracked = persisted.tracked,
                "some attachments were not persisted"
            );
        }

        if session.all_failed() {
            events.emit(Event::Error {
                task: None,
                message: format!("all {} upstream tasks failed", session.tasks().len()),
            });
        }

        let report = session.complete(outcomes);
        events.emit(Event::AttachmentBatch {
            count: report.attachment_keys.len(),
        });
        events.emit(Event::Complete(report.clone()));

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            attachments = report.attachment_keys.len(),
            duration_ms = report.duration_ms,
            "session completed"
        );
        report
    }
}
