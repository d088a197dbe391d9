//! Streaming generation endpoint

use axum::extract::{Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderName;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prism::config::validate_fan_out;
use prism::orchestrator::GenerationRequest;
use prism::providers::Modality;
use prism::streaming::{event_channel, pump};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::sink::SseChannelSink;
use crate::state::AppState;

/// Frames buffered between the session and a slow client
const SSE_BUFFER: usize = 64;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Request body (POST) or query string (GET)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: Option<String>,
    /// Accepted in place of `prompt`
    #[serde(default)]
    pub paper_text: Option<String>,
    #[serde(default)]
    pub fan_out: Option<usize>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub image_size: Option<String>,
    #[serde(default)]
    pub modality: Option<Modality>,
}

impl GenerateBody {
    pub fn into_request(self) -> Result<GenerationRequest, ApiError> {
        let prompt = [self.prompt, self.paper_text]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing prompt".to_string()))?;

        Ok(GenerationRequest {
            prompt,
            fan_out: self.fan_out,
            aspect_ratio: self.aspect_ratio,
            image_size: self.image_size,
            modality: self.modality,
        })
    }
}

pub async fn stream_json(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Response, ApiError> {
    start_stream(state, body)
}

pub async fn stream_query(
    State(state): State<AppState>,
    Query(body): Query<GenerateBody>,
) -> Result<Response, ApiError> {
    start_stream(state, body)
}

/// Validate the request, then run the session in the background and stream
/// its events. Problems found here are plain 400s; anything later arrives
/// as an `error` event.
fn start_stream(state: AppState, body: GenerateBody) -> Result<Response, ApiError> {
    let request = body.into_request()?;
    let fan_out = request
        .fan_out
        .unwrap_or(state.orchestrator.options().fan_out.degree);
    validate_fan_out(fan_out).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (events, events_rx) = event_channel();
    let (tx, rx) = mpsc::channel(SSE_BUFFER);
    let orchestrator = Arc::clone(&state.orchestrator);

    tokio::spawn(async move {
        let mut sink = SseChannelSink::new(tx);
        let (report, pumped) =
            tokio::join!(orchestrator.run(request, events), pump(events_rx, &mut sink));

        if let Err(e) = report {
            warn!(error = %e, "session rejected");
        }
        match pumped {
            Ok(written) => debug!(written, "event stream finished"),
            Err(e) => debug!(error = %e, "client went away before completion"),
        }
    });

    let stream = Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default());
    Ok((
        [(CACHE_CONTROL, "no-cache"), (X_ACCEL_BUFFERING, "no")],
        stream,
    )
        .into_response())
}
