//! # HTTP Trigger
//!
//! A minimal axum server so a scheduler (Cloud Scheduler, cron, a CI job) can start
//! rotations over HTTP. Only one rotation runs at a time; a trigger that arrives while
//! one is running gets `409 Conflict`.

use crate::clients::SchedulerControl;
use crate::errors::{Result, RotatorError};
use crate::rotation::{RotationOutcome, Rotator};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared by every request: the rotator, the optional scheduler to pause, and the lock
/// that keeps invocations sequential.
#[derive(Clone)]
pub struct TriggerState {
    rotator: Arc<Rotator>,
    scheduler: Option<Arc<dyn SchedulerControl>>,
    running: Arc<Mutex<()>>,
}

impl TriggerState {
    pub fn new(rotator: Arc<Rotator>) -> Self {
        Self { rotator, scheduler: None, running: Arc::new(Mutex::new(())) }
    }

    /// Pause this scheduler job after a successful rotation
    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerControl>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn rotator(&self) -> &Rotator {
        &self.rotator
    }

    /// Run one rotation and, if it completed, pause the trigger job.
    ///
    /// A failed pause is logged and does not change the outcome; the next scheduled run
    /// finds nothing to do and simply rotates to the same state again.
    pub async fn invoke(&self) -> RotationOutcome {
        let outcome = self.rotator.rotate().await;

        if outcome.rotated {
            if let Some(scheduler) = &self.scheduler {
                if let Err(e) = scheduler.pause_job().await {
                    warn!(error = %e, "Failed to pause rotation trigger");
                }
            }
        }
        outcome
    }

    /// Like [`TriggerState::invoke`], unless a rotation is already running
    pub async fn try_invoke(&self) -> Option<RotationOutcome> {
        let _guard = self.running.try_lock().ok()?;
        Some(self.invoke().await)
    }
}

impl std::fmt::Debug for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerState")
            .field("rotator", &self.rotator)
            .field("pauses_scheduler", &self.scheduler.is_some())
            .finish()
    }
}

async fn rotate_handler(State(state): State<TriggerState>) -> Response {
    match state.try_invoke().await {
        Some(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        None => {
            info!("Rotation already in progress, rejecting trigger");
            let body = RotationOutcome::halted("rotation already in progress");
            (StatusCode::CONFLICT, Json(body)).into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Build the trigger router.
pub fn build_router(state: TriggerState) -> Router {
    Router::new()
        .route("/rotate", post(rotate_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the trigger on `bind_address` until `shutdown` resolves.
pub async fn serve<F>(bind_address: &str, state: TriggerState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| RotatorError::config(format!("Invalid bind address '{}': {}", bind_address, e)))?;

    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Rotation trigger listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(RotatorError::from)?;

    info!("Rotation trigger stopped");
    Ok(())
}
