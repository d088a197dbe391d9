//! Upstream tasks
//!
//! One task is one streaming request against the generation API together
//! with its own decode pipeline. A task's failure is contained here and
//! never reaches its siblings.

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::background::PersistenceTracker;
use crate::network::{with_timeout_and_cancel, TimeoutOrAbortError};
use crate::providers::{GenerationProvider, UpstreamError, UpstreamRequest};
use crate::store::{AttachmentWriter, StoreError};
use crate::streaming::{
    AccumulatorStats, AttachmentCandidate, ChunkAccumulator, DecodedObject, Event, EventSender,
    ObjectExtractor, TaskId,
};

/// Lifecycle of an upstream task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Ended,
    Errored,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// Final account of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task: TaskId,
    pub status: TaskStatus,
    /// Keys announced through `AttachmentReady`, in announcement order
    pub attachment_keys: Vec<String>,
    /// All text the task produced
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub objects: usize,
    pub dropped: usize,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    attachment_keys: Vec<String>,
    error: Option<String>,
}

/// State of a task shared between the task itself, its persistence
/// operations and the session.
///
/// Status transitions and the events attributed to the task happen under
/// the same lock, so nothing but the task's own `Error` can follow it
/// entering `Errored`.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    state: Arc<Mutex<TaskState>>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(TaskState {
                status: TaskStatus::Running,
                attachment_keys: Vec::new(),
                error: None,
            })),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Mark the task errored and emit its `Error` event. No-op once the
    /// task has reached a terminal status.
    pub(crate) fn fail(&self, message: String, events: &EventSender) {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return;
        }
        state.status = TaskStatus::Errored;
        state.error = Some(message.clone());
        events.emit(Event::Error {
            task: Some(self.id),
            message,
        });
    }

    pub(crate) fn end(&self) {
        let mut state = self.state.lock();
        if state.status == TaskStatus::Running {
            state.status = TaskStatus::Ended;
        }
    }

    /// Emit `event` unless the task has errored. Returns whether it was sent.
    fn emit_if_live(&self, event: Event, events: &EventSender) -> bool {
        let state = self.state.lock();
        if state.status == TaskStatus::Errored {
            return false;
        }
        events.emit(event);
        true
    }

    /// Record a persisted attachment and announce it, unless the task has
    /// errored in the meantime.
    fn announce(&self, key: String, mime_type: String, size: u64, events: &EventSender) -> bool {
        let mut state = self.state.lock();
        if state.status == TaskStatus::Errored {
            return false;
        }
        state.attachment_keys.push(key.clone());
        events.emit(Event::AttachmentReady {
            task: self.id,
            key,
            mime_type,
            size,
        });
        true
    }

    pub(crate) fn report(&self, outcome: TaskOutcome) -> TaskReport {
        let state = self.state.lock();
        TaskReport {
            task: self.id,
            status: state.status,
            attachment_keys: state.attachment_keys.clone(),
            text: outcome.text,
            error: state.error.clone(),
            objects: outcome.stats.objects,
            dropped: outcome.stats.dropped,
        }
    }
}

/// What a task's decode loop leaves behind
#[derive(Debug, Default)]
pub(crate) struct TaskOutcome {
    pub text: String,
    pub stats: AccumulatorStats,
}

/// Collaborators shared by every task of a session
pub(crate) struct TaskContext {
    pub provider: Arc<dyn GenerationProvider>,
    pub writer: Arc<dyn AttachmentWriter>,
    pub tracker: PersistenceTracker,
    pub events: EventSender,
    pub extractor: ObjectExtractor,
    pub request: UpstreamRequest,
    pub forward_text: bool,
    pub request_timeout_ms: u64,
    /// Cancelled when the consumer goes away
    pub cancel: CancellationToken,
}

/// One upstream request and its decode pipeline
pub struct UpstreamTask {
    handle: TaskHandle,
    accumulator: ChunkAccumulator,
    text: String,
}

impl UpstreamTask {
    pub(crate) fn new(handle: TaskHandle) -> Self {
        Self {
            handle,
            accumulator: ChunkAccumulator::new(),
            text: String::new(),
        }
    }

    /// Drive the task to a terminal status. Never returns an error: every
    /// failure is turned into the task's `Error` event.
    pub(crate) async fn run(mut self, ctx: Arc<TaskContext>) -> TaskOutcome {
        let result =
            with_timeout_and_cancel(self.consume(&ctx), ctx.request_timeout_ms, &ctx.cancel).await;

        match result {
            Ok(Ok(())) => {
                self.handle.end();
                info!(
                    objects = self.accumulator.stats().objects,
                    text_len = self.text.len(),
                    "task ended"
                );
            }
            Ok(Err(err)) => {
                error!(error = %err, "task failed");
                self.handle.fail(err.to_string(), &ctx.events);
            }
            Err(TimeoutOrAbortError::Timeout(timeout)) => {
                let err = UpstreamError::from(timeout);
                error!(error = %err, "task timed out");
                self.handle.fail(err.to_string(), &ctx.events);
            }
            Err(TimeoutOrAbortError::Abort(_)) => {
                info!("consumer disconnected, task stopped reading");
                self.handle.end();
            }
        }

        TaskOutcome {
            text: self.text,
            stats: self.accumulator.stats(),
        }
    }

    async fn consume(&mut self, ctx: &Arc<TaskContext>) -> Result<(), UpstreamError> {
        let mut stream = ctx.provider.stream_generate(&ctx.request).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for object in self.accumulator.feed(&chunk) {
                self.handle_object(object, ctx)?;
            }
        }

        if let Some(object) = self.accumulator.flush() {
            self.handle_object(object, ctx)?;
        }

        let stats = self.accumulator.stats();
        if stats.objects == 0 {
            return Err(UpstreamError::malformed(format!(
                "no complete object in {} response bytes",
                stats.bytes_in
            )));
        }
        Ok(())
    }

    fn handle_object(&mut self, object: DecodedObject, ctx: &Arc<TaskContext>) -> Result<(), UpstreamError> {
        let extraction = ctx.extractor.extract(object);

        if let Some(err) = extraction.error {
            return Err(UpstreamError::Api {
                code: err.code,
                message: err.message,
            });
        }

        if !extraction.text.is_empty() {
            self.text.push_str(&extraction.text);
            if ctx.forward_text {
                self.handle.emit_if_live(
                    Event::TextDelta {
                        task: self.handle.id(),
                        text: extraction.text,
                        accumulated: self.text.clone(),
                    },
                    &ctx.events,
                );
            }
        }

        for candidate in extraction.attachments {
            self.persist(candidate, ctx);
        }
        Ok(())
    }

    /// Hand an attachment to the store as a tracked operation. Tracking
    /// starts before the write does.
    fn persist(&self, candidate: AttachmentCandidate, ctx: &Arc<TaskContext>) {
        let handle = self.handle.clone();
        let writer = Arc::clone(&ctx.writer);
        let events = ctx.events.clone();
        let size = candidate.payload.len();
        debug!(size, mime_type = %candidate.mime_type, "attachment detected");

        ctx.tracker.track(
            async move {
                let stored = writer
                    .put(candidate.payload, &candidate.mime_type)
                    .await
                    .inspect_err(|e| warn!(error = %e, "failed to persist attachment"))?;

                let key = stored.key.clone();
                if !handle.announce(stored.key, stored.mime_type, stored.size, &events) {
                    debug!(key = %key, "task errored before attachment settled, discarding");
                    if let Err(e) = writer.delete(&key).await {
                        warn!(key = %key, error = %e, "failed to discard attachment");
                    }
                }
                Ok::<_, StoreError>(key)
            }
            .in_current_span(),
        );
    }
}
