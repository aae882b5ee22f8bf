use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use genui_core::{GenerationRecord, GenerationStatus, RuntimeConfig, RuntimeConfigPatch};
use genui_service::{GenerationEvent, SchedulerStats};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

const CATCH_UP_LIMIT: usize = 1024;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub generations: usize,
    pub scheduler: SchedulerStats,
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Serialize)]
pub struct GenerateAccepted {
    pub id: Uuid,
    pub status: GenerationStatus,
}

#[derive(Deserialize)]
pub struct SyncGenerateQuery {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Replay buffered events with a sequence number above this one first
    pub since: Option<u64>,
    /// Only stream events of this generation
    pub generation_id: Option<Uuid>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        generations: state.service.list_generations().len(),
        scheduler: state.service.scheduler_stats(),
    })
}

pub async fn start_generation(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateAccepted>)> {
    let record = state.service.start_generation(&request.prompt)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateAccepted {
            id: record.id,
            status: record.status,
        }),
    ))
}

pub async fn list_generations(State(state): State<AppState>) -> Json<Vec<GenerationRecord>> {
    Json(state.service.list_generations())
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GenerationRecord>> {
    Ok(Json(state.service.get_status(parse_id(&id)?)?))
}

pub async fn view_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Html<String>> {
    Ok(Html(state.service.get_artifact(parse_id(&id)?).await?))
}

/// Runs the pipeline inline and answers with the finished page.
pub async fn generate_sync(
    State(state): State<AppState>,
    Query(query): Query<SyncGenerateQuery>,
) -> ApiResult<Html<String>> {
    let outcome = state.service.generate_sync(&query.prompt).await?;
    tracing::info!(
        score = outcome.score,
        iterations = outcome.iterations,
        "Synchronous generation finished"
    );
    Ok(Html(outcome.artifact))
}

pub async fn get_config(State(state): State<AppState>) -> Json<RuntimeConfig> {
    Json(state.service.get_config())
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(patch): Json<RuntimeConfigPatch>,
) -> ApiResult<Json<RuntimeConfig>> {
    Ok(Json(state.service.update_config(&patch)?))
}

pub async fn reset_config(State(state): State<AppState>) -> Json<RuntimeConfig> {
    Json(state.service.reset_config())
}

fn to_sse(event: &GenerationEvent) -> Option<Event> {
    Event::default()
        .id(event.seq.to_string())
        .json_data(event)
        .ok()
}

/// Server-sent stream of record changes.
///
/// With `since`, buffered events newer than that sequence number are sent
/// before live ones; a lagging client skips the events it missed.
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let bus = state.service.events().clone();
    // subscribe before reading the buffer so nothing falls between the two
    let live = BroadcastStream::new(bus.subscribe());
    let backlog = match query.since {
        Some(since) => bus.recent_since(since, CATCH_UP_LIMIT),
        None => Vec::new(),
    };
    let replayed_up_to = backlog.last().map(|e| e.seq).unwrap_or(0);
    let filter = query.generation_id;

    let live = live.filter_map(move |item| async move {
        match item {
            Ok(event) if event.seq > replayed_up_to => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event stream subscriber lagged");
                None
            }
        }
    });

    let events = stream::iter(backlog)
        .chain(live)
        .filter(move |event| {
            let keep = filter.map_or(true, |id| event.generation_id == id);
            async move { keep }
        })
        .filter_map(|event| async move { to_sse(&event).map(Ok) });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("'{}' is not a generation id", raw)))
}
