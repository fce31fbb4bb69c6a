//! HTTP route handlers.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{Method, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::domain::Station;
use crate::realtime::ConnectionState;
use crate::regions::{RegionId, UNCLASSIFIED};
use crate::spatial;
use crate::store::MergeOutcome;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stations", get(list_stations))
        .route("/api/stations/map", get(station_map))
        .route("/api/stations/:id", get(station_detail))
        .route("/api/regions", get(region_counts))
        .route("/api/status", get(status))
        .route("/api/refresh", post(refresh))
        .route("/api/events", get(events))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors())
        .with_state(state)
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// All stations, optionally restricted to one region.
async fn list_stations(
    State(state): State<AppState>,
    Query(query): Query<StationsQuery>,
) -> Result<Response, AppError> {
    let outcome = state.store.fetch_stations().await;

    let stations: Vec<&Station> = match query.region.as_deref().map(str::trim) {
        Some(region) => {
            let wanted = RegionId::new(region);
            if region != UNCLASSIFIED && state.classifier.table().region(&wanted).is_none() {
                return Err(AppError::BadRequest {
                    message: format!("unknown region: {region}"),
                });
            }
            outcome
                .stations
                .iter()
                .filter(|s| state.classifier.classify(s) == wanted)
                .collect()
        }
        None => outcome.stations.iter().collect(),
    };

    Ok(Json(StationsResponse {
        stations,
        source: outcome.source,
        error: outcome.error.as_ref(),
        fetched_at: outcome.fetched_at,
        stats: outcome.stats,
    })
    .into_response())
}

/// Coordinate-only projection for map rendering.
async fn station_map(State(state): State<AppState>) -> Json<MapResponse> {
    let outcome = state.store.fetch_stations().await;
    let points = spatial::project(&outcome.stations);

    Json(MapResponse {
        bounds: spatial::bounds(&points),
        excluded: outcome.stations.len() - points.len(),
        points,
        source: outcome.source,
    })
}

/// One station and the region it falls in.
async fn station_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state.store.fetch_stations().await;
    let station = outcome
        .stations
        .iter()
        .find(|s| s.id.as_str() == id)
        .ok_or_else(|| AppError::NotFound {
            message: format!("station {id} not found"),
        })?;

    Ok(Json(StationDetailResponse {
        station,
        region: state.classifier.classify(station),
        source: outcome.source,
    })
    .into_response())
}

/// Station counts per region.
async fn region_counts(State(state): State<AppState>) -> Json<RegionsResponse> {
    let outcome = state.store.fetch_stations().await;
    let counts = state.classifier.counts(&outcome.stations);

    let regions = state
        .classifier
        .table()
        .regions()
        .iter()
        .map(|r| RegionCount {
            id: r.id.clone(),
            name: r.name.clone(),
            count: counts.get(r.id.as_str()),
        })
        .collect();

    Json(RegionsResponse {
        regions,
        unclassified: counts.unclassified(),
        total: counts.total(),
        source: outcome.source,
    })
}

/// Store and realtime health, without triggering a fetch.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let realtime = match &state.realtime {
        Some(channel) => RealtimeStatus {
            enabled: true,
            state: channel.current_state(),
            stats: Some(channel.stats()),
        },
        None => RealtimeStatus {
            enabled: false,
            state: ConnectionState::Disconnected,
            stats: None,
        },
    };

    Json(StatusResponse {
        store: state.store.status().await,
        realtime,
    })
}

/// Drop the cached snapshot and fetch again.
async fn refresh(State(state): State<AppState>) -> Json<RefreshResponse> {
    state.store.invalidate().await;
    let outcome = state.store.fetch_stations().await;
    info!(
        source = ?outcome.source,
        stations = outcome.stations.len(),
        "manual refresh"
    );

    Json(RefreshResponse {
        source: outcome.source,
        station_count: outcome.stations.len(),
        error: outcome.error,
        fetched_at: outcome.fetched_at,
    })
}

/// Server-sent events: applied realtime updates and connection state changes.
async fn events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let channel = state.realtime.ok_or_else(|| AppError::NotFound {
        message: "realtime updates are not enabled".to_string(),
    })?;

    let updates = channel.subscribe();
    let mut states = channel.state();
    let initial = state_event(*states.borrow_and_update());

    let changes = stream::unfold((updates, states), |(mut updates, mut states)| async move {
        loop {
            tokio::select! {
                received = updates.recv() => match received {
                    Ok(applied) if applied.outcome == MergeOutcome::Applied => {
                        match Event::default().event("update").json_data(&applied.update) {
                            Ok(event) => return Some((Ok(event), (updates, states))),
                            Err(e) => warn!(error = %e, "failed to encode update event"),
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagging, updates skipped");
                    }
                    Err(RecvError::Closed) => return None,
                },
                changed = states.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let event = state_event(*states.borrow_and_update());
                    return Some((Ok(event), (updates, states)));
                }
            }
        }
    });

    let stream = stream::once(async move { Ok(initial) }).chain(changes);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn state_event(state: ConnectionState) -> Event {
    Event::default().event("state").data(state.as_str())
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
        };

        warn!(status = %status, message = %message, "request failed");

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
