//! JSON-over-HTTP surface of the engine.

mod dto;
mod error;
mod handlers;

pub use dto::{BookingView, CreateBookingRequest, EventView, SlotView, SpanView, UpdateBookingRequest};
pub use error::{ApiError, ErrorBody};

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::identity::IdentityProvider;
use crate::observability::track_requests;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Ends open event streams once the server starts shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            engine,
            identity,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route(
            "/bookings",
            get(handlers::list_bookings).post(handlers::create_booking),
        )
        .route("/bookings/validate", post(handlers::validate_booking))
        .route(
            "/bookings/{id}",
            get(handlers::get_booking)
                .put(handlers::update_booking)
                .delete(handlers::delete_booking),
        )
        .route("/resources/{id}/occupant", get(handlers::occupant))
        .route("/resources/{id}/free", get(handlers::free_windows))
        .route("/resources/{id}/day", get(handlers::day_grid))
        .route("/resources/{id}/events", get(handlers::events))
        .route_layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `app` until `shutdown` fires, then give in-flight requests up to
/// `drain` to finish before returning.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    drain: Duration,
) -> std::io::Result<()> {
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = shutdown.cancelled() => {}
    }

    info!("draining requests...");
    tokio::select! {
        result = &mut server => {
            info!("all requests drained");
            result
        }
        _ = tokio::time::sleep(drain) => {
            warn!("drain timeout after {}s, closing remaining connections", drain.as_secs());
            Ok(())
        }
    }
}
