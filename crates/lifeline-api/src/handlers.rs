//! HTTP handlers.
//!
//! Ingestion bodies are parsed leniently: a body that is not a JSON object
//! is treated as `{}`. A field counts as present only when it is truthy
//! (not null, `false`, `0`, or an empty string).

use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use lifeline_core::{EventKind, Timestamp};
use lifeline_state::{DailyMetric, Instance};

use crate::ApiState;
use crate::error::IngestError;

const DEFAULT_METRICS_LIMIT: usize = 30;

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub(crate) fn err(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

impl ApiResponse<()> {
    fn done() -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            error: None,
        })
    }
}

/// Body returned by `/on-post-install`.
#[derive(Debug, Serialize)]
pub struct Installed {
    success: bool,
    #[serde(rename = "instanceID")]
    instance_id: String,
    #[serde(rename = "birthDate")]
    birth_date: Timestamp,
}

type Done = Json<ApiResponse<()>>;

// ── Body parsing ───────────────────────────────────────────────

fn parse_body(body: &Bytes) -> Map<String, Value> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn field<'a>(body: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    body.get(key).filter(|v| is_truthy(v))
}

/// The `instanceID` field, if present.
///
/// Strings are used as-is and numbers are stringified. Any other truthy
/// value (`true`, arrays, objects) is rejected as a missing field rather
/// than replaced.
fn instance_id(body: &Map<String, Value>) -> Result<Option<String>, IngestError> {
    match field(body, "instanceID") {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(IngestError::MissingFields),
    }
}

fn required_id(body: &Map<String, Value>) -> Result<String, IngestError> {
    instance_id(body)?.ok_or(IngestError::MissingFields)
}

fn required<'a>(body: &'a Map<String, Value>, key: &str) -> Result<&'a Value, IngestError> {
    field(body, key).ok_or(IngestError::MissingFields)
}

// ── Ingestion ──────────────────────────────────────────────────

/// POST /on-post-install
///
/// An absent `instanceID` gets a fresh UUID. A numeric one is stringified;
/// any other non-string value fails with `Missing required fields`.
pub async fn on_post_install(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<Installed>, IngestError> {
    let body = parse_body(&body);
    let instance_id = instance_id(&body)?.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let instance = state.registry.setup(&instance_id)?;
    let birth_date = instance
        .last_setup_at
        .unwrap_or_else(|| state.clock.now_ms());

    Ok(Json(Installed {
        success: true,
        instance_id,
        birth_date,
    }))
}

/// POST /on-start
pub async fn on_start(State(state): State<ApiState>, body: Bytes) -> Result<Done, IngestError> {
    let body = parse_body(&body);
    let instance_id = required_id(&body)?;
    let data = required(&body, "data")?;

    state.registry.start(&instance_id, data.clone())?;
    Ok(ApiResponse::done())
}

/// POST /on-utterance
pub async fn on_utterance(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Done, IngestError> {
    let body = parse_body(&body);
    let instance_id = required_id(&body)?;
    let data = required(&body, "data")?;

    state.registry.utterance(&instance_id, data.clone())?;
    Ok(ApiResponse::done())
}

/// POST /on-event
pub async fn on_event(State(state): State<ApiState>, body: Bytes) -> Result<Done, IngestError> {
    let body = parse_body(&body);
    let instance_id = required_id(&body)?;
    let event_name = required(&body, "eventName")?;

    let kind: EventKind = event_name
        .as_str()
        .and_then(|name| name.parse().ok())
        .ok_or_else(|| {
            debug!(%instance_id, %event_name, "invalid event name");
            IngestError::InvalidEventName
        })?;

    state.registry.record_event(&instance_id, kind)?;
    Ok(ApiResponse::done())
}

/// POST /on-error
pub async fn on_error(State(state): State<ApiState>, body: Bytes) -> Result<Done, IngestError> {
    let body = parse_body(&body);
    let instance_id = required_id(&body)?;
    let error = required(&body, "error")?;

    let message = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    state.registry.error(&instance_id, message)?;
    Ok(ApiResponse::done())
}

// ── Reads ──────────────────────────────────────────────────────

/// GET /instances/{id}
pub async fn get_instance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Instance>>, IngestError> {
    match state.registry.find(&id)? {
        Some(instance) => Ok(ApiResponse::ok(instance)),
        None => Err(IngestError::InstanceNotFound),
    }
}

/// GET /daily-metrics?limit=N
///
/// The query is read as plain strings so a malformed `limit` answers with
/// the JSON error envelope instead of an extractor rejection.
pub async fn list_daily_metrics(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<Vec<DailyMetric>>>, IngestError> {
    let limit = match query.get("limit") {
        None => DEFAULT_METRICS_LIMIT,
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| IngestError::InvalidParameter("limit"))?,
    };
    let metrics = state.repo.list_daily_metrics(limit)?;
    Ok(ApiResponse::ok(metrics))
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, IngestError> {
    let latest = state.repo.list_daily_metrics(1)?;
    let body = lifeline_aggregate::render_prometheus(latest.first());
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}
