use std::convert::Infallible;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use chrono::Utc;
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::{MAX_DAY_SLOTS, MAX_ID_LEN};
use crate::model::*;

use super::dto::*;
use super::error::ApiError;
use super::AppState;

const DEFAULT_SLOT_MINUTES: u32 = 60;
const MINUTES_PER_DAY: u32 = 24 * 60;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn booking_id(path: Result<Path<String>, PathRejection>) -> Result<Ulid, ApiError> {
    let Path(raw) = path.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ulid::from_string(&raw).map_err(|_| ApiError::BadRequest(format!("invalid booking id: {raw}")))
}

/// Resource ids come straight from the path; bound them before they reach
/// the engine or the notify hub.
fn checked_resource(raw: String) -> Result<ResourceId, ApiError> {
    if raw.trim().is_empty() {
        return Err(EngineError::InvalidInput("resource required").into());
    }
    if raw.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("resource id too long").into());
    }
    Ok(raw)
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingView>), ApiError> {
    let actor = state.identity.actor_id(&headers);
    let draft = body(payload)?.into_draft(actor)?;
    let booking = state.engine.create(draft).await?;
    info!(
        "booking {} created on {} by {}",
        booking.id, booking.resource_id, booking.owner_id
    );
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// Dry run of `create_booking`: same checks, nothing stored.
pub async fn validate_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let actor = state.identity.actor_id(&headers);
    let draft = body(payload)?.into_draft(actor)?;
    state.engine.propose(&draft, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_bookings(
    State(state): State<AppState>,
    params: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let params = query(params)?;
    let window = params.window()?;
    let bookings = state.engine.list(&params.scope(), window).await;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

pub async fn get_booking(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<BookingView>, ApiError> {
    let id = booking_id(path)?;
    let booking = state
        .engine
        .get_booking(id)
        .await
        .ok_or(EngineError::NotFound(id))?;
    Ok(Json(booking.into()))
}

pub async fn update_booking(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateBookingRequest>, JsonRejection>,
) -> Result<Json<BookingView>, ApiError> {
    let id = booking_id(path)?;
    // An unknown id is reported before anything about the body.
    if state.engine.get_booking(id).await.is_none() {
        return Err(EngineError::NotFound(id).into());
    }
    let amendment = body(payload)?.into_amendment()?;
    let booking = state.engine.amend(id, amendment).await?;
    info!("booking {id} amended to {}", booking.span);
    Ok(Json(booking.into()))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<BookingView>, ApiError> {
    let id = booking_id(path)?;
    let booking = state.engine.retract(id).await?;
    info!("booking {id} retracted from {}", booking.resource_id);
    Ok(Json(booking.into()))
}

pub async fn occupant(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    params: Result<Query<OccupantQuery>, QueryRejection>,
) -> Result<Json<Option<BookingView>>, ApiError> {
    let resource_id = checked_resource(resource_id)?;
    let at = parse_instant("at", &query(params)?.at)?;
    let found = state.engine.find_occupant(&resource_id, at).await?;
    Ok(Json(found.map(BookingView::from)))
}

pub async fn free_windows(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    params: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<Vec<SpanView>>, ApiError> {
    let resource_id = checked_resource(resource_id)?;
    let params = query(params)?;
    let span = window(&params.start, &params.end)?;
    let free = state.engine.free_windows(&resource_id, span).await?;
    Ok(Json(free.into_iter().map(SpanView::from).collect()))
}

pub async fn day_grid(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    params: Result<Query<DayQuery>, QueryRejection>,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let resource_id = checked_resource(resource_id)?;
    let params = query(params)?;
    let minutes = params.slot_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
    if minutes == 0 || MINUTES_PER_DAY % minutes != 0 {
        return Err(ApiError::BadRequest(format!(
            "slotMinutes must divide {MINUTES_PER_DAY}"
        )));
    }
    let slots = ((MINUTES_PER_DAY / minutes) as usize).min(MAX_DAY_SLOTS);
    let grid = state
        .engine
        .day_grid(
            &resource_id,
            day_start(params.date),
            Ms::from(minutes) * 60_000,
            slots,
            Utc::now().timestamp_millis(),
        )
        .await?;
    Ok(Json(grid.into_iter().map(SlotView::from).collect()))
}

/// Server-sent change feed for one resource. A lagging client receives a
/// `resync` event and should refetch. Streams end on server shutdown.
pub async fn events(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let resource_id = checked_resource(resource_id)?;
    let subscription = state.engine.subscribe(&resource_id);
    info!("event stream opened for {resource_id}");

    let stream = stream::unfold(
        (subscription, state.shutdown),
        |(mut subscription, shutdown)| async move {
            let received = tokio::select! {
                received = subscription.recv() => received,
                _ = shutdown.cancelled() => return None,
            };
            let event = match received {
                Ok(event) => {
                    let view = EventView::from(event);
                    SseEvent::default()
                        .event(view.kind())
                        .json_data(&view)
                        .unwrap_or_else(|e| SseEvent::default().event("error").data(e.to_string()))
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "event stream for {} lagged, {skipped} events skipped",
                        subscription.resource_id()
                    );
                    SseEvent::default().event("resync").data(skipped.to_string())
                }
                Err(RecvError::Closed) => return None,
            };
            Some((Ok(event), (subscription, shutdown)))
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
