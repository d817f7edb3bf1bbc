//! The HTTP surface a standalone watcher exposes: a health check, the
//! switch table (so `switch-cli` can submit a newly enrolled switch and
//! recipients can fetch one to recover), and a thin REST façade over
//! this watcher's [`LocalSubstrate`](crate::services::substrate::LocalSubstrate)
//! so `switch-cli` can publish and collect records without embedding a
//! substrate implementation of its own.
//!
//! None of this is the distributed substrate protocol (see `DESIGN.md`):
//! it is the boundary a single standalone watcher process exposes to
//! the owner/recipient clients that talk to it over the network.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use switch_types::error::SwitchError;
use switch_types::ids::SwitchId;
use switch_types::store::SwitchStore;
use switch_types::substrate::{Record, Substrate, Topic};
use switch_types::switch::Switch;

use crate::services::collect;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub(crate) struct ApiState<Store, Sub> {
    pub(crate) store: Arc<Store>,
    pub(crate) substrate: Arc<Sub>,
    /// Bound on how long a `GET /substrate/.../snapshot` request waits
    /// for the replay to drain.
    pub(crate) snapshot_timeout: Duration,
}

/// Builds the router for a watcher's HTTP surface.
pub(crate) fn routes<Store, Sub>(state: ApiState<Store, Sub>) -> Router
where
    Store: SwitchStore + 'static,
    Sub: Substrate + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/switches", post(submit_switch::<Store, Sub>))
        .route("/switches/{id}", get(get_switch::<Store, Sub>))
        .route(
            "/substrate/{topic}/{switch_id}/publish",
            post(publish::<Store, Sub>),
        )
        .route(
            "/substrate/{topic}/{switch_id}/snapshot",
            get(snapshot::<Store, Sub>),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}

async fn submit_switch<Store, Sub>(
    State(state): State<ApiState<Store, Sub>>,
    Json(switch): Json<Switch>,
) -> Result<impl IntoResponse, ApiError>
where
    Store: SwitchStore,
    Sub: Substrate,
{
    state.store.insert(switch).await?;
    Ok(StatusCode::CREATED)
}

async fn get_switch<Store, Sub>(
    State(state): State<ApiState<Store, Sub>>,
    Path(id): Path<SwitchId>,
) -> Result<impl IntoResponse, ApiError>
where
    Store: SwitchStore,
    Sub: Substrate,
{
    match state.store.get(id).await? {
        Some(switch) => Ok(Json(switch)),
        None => Err(ApiError(SwitchError::StateConflict(format!(
            "no such switch {id}"
        )))),
    }
}

fn parse_topic(kind: &str, switch_id: SwitchId) -> Result<Topic, ApiError> {
    match kind {
        "heartbeat" => Ok(Topic::Heartbeat(switch_id)),
        "share" => Ok(Topic::ShareEnvelope(switch_id)),
        "release" => Ok(Topic::Release(switch_id)),
        "cancellation" => Ok(Topic::Cancellation(switch_id)),
        other => Err(ApiError(SwitchError::InvalidParameters(format!(
            "unknown substrate topic kind {other}"
        )))),
    }
}

async fn publish<Store, Sub>(
    State(state): State<ApiState<Store, Sub>>,
    Path((kind, switch_id)): Path<(String, SwitchId)>,
    Json(record): Json<Record>,
) -> Result<impl IntoResponse, ApiError>
where
    Store: SwitchStore,
    Sub: Substrate,
{
    let topic = parse_topic(&kind, switch_id)?;
    state.substrate.publish(topic, record).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn snapshot<Store, Sub>(
    State(state): State<ApiState<Store, Sub>>,
    Path((kind, switch_id)): Path<(String, SwitchId)>,
) -> Result<impl IntoResponse, ApiError>
where
    Store: SwitchStore,
    Sub: Substrate,
{
    let topic = parse_topic(&kind, switch_id)?;
    let records = collect::snapshot(state.substrate.as_ref(), topic, state.snapshot_timeout).await?;
    Ok(Json(records))
}

/// Wraps [`SwitchError`] for the one place this crate turns it into an
/// HTTP response rather than propagating it.
struct ApiError(SwitchError);

impl From<SwitchError> for ApiError {
    fn from(err: SwitchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            SwitchError::StateConflict(_) | SwitchError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            SwitchError::Timeout | SwitchError::SubstrateUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}
