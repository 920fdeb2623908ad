//! REST control surface for the Monte Carlo experiment executor.
//!
//! Routes live under `/v1/monte-carlo` plus the glue CRUD surfaces for
//! configurations and single simulation runs named in `handlers`. All
//! state is held behind `Arc` so handlers never block each other beyond
//! the short critical sections each store's own mutex guards.

mod handlers;
mod types;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;

use crate::config::ConfigStore;
use crate::experiment::{ExecutionHandle, ExperimentStore};

/// Shared application state across all request handlers.
///
/// `handles` tracks the in-flight [`ExecutionHandle`] for every experiment
/// currently running in the background, so the progress endpoint can
/// report live completion counts instead of only the last value
/// [`crate::experiment::execute`] wrote to the store, and so the delete
/// endpoint has something to cancel. An experiment's handle is removed
/// once its background task finishes.
pub struct AppState {
    pub config_store: Arc<dyn ConfigStore>,
    pub experiment_store: Arc<dyn ExperimentStore>,
    pub handles: Mutex<HashMap<u64, ExecutionHandle>>,
}

impl AppState {
    /// Builds fresh, empty stores, seeded with a baseline configuration at
    /// id 1 so a freshly started server always has something to run.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            config_store: crate::config::InMemoryConfigStore::with_baseline(),
            experiment_store: crate::experiment::InMemoryExperimentStore::new(),
            handles: Mutex::new(HashMap::new()),
        })
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/simulation/run", post(handlers::run_simulation))
        .route(
            "/v1/configurations",
            get(handlers::list_configurations).post(handlers::create_configuration),
        )
        .route(
            "/v1/configurations/{id}",
            get(handlers::get_configuration).delete(handlers::delete_configuration),
        )
        .route(
            "/v1/monte-carlo/start",
            post(handlers::start_experiment),
        )
        .route(
            "/v1/monte-carlo/experiments",
            get(handlers::list_experiments),
        )
        .route(
            "/v1/monte-carlo/experiments/{id}",
            get(handlers::get_experiment).delete(handlers::delete_experiment),
        )
        .route(
            "/v1/monte-carlo/experiments/{id}/progress",
            get(handlers::get_progress),
        )
        .route(
            "/v1/monte-carlo/experiments/{id}/replicas",
            get(handlers::get_replicas),
        )
        .route(
            "/v1/monte-carlo/experiments/{id}/anova",
            get(handlers::get_anova),
        )
        .route(
            "/v1/monte-carlo/experiments/{id}/series-temporales",
            get(handlers::get_series),
        )
        .with_state(state)
}

/// Binds to the given address and serves the API.
///
/// # Panics
///
/// Panics if the TCP listener cannot bind to `addr`.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {addr}: {e}"));
    eprintln!("API server listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| panic!("server error: {e}"));
}

/// Also used by `delete` (which removes the handle once cancellation is
/// requested) to avoid this module's route table needing `and_then`-style
/// wiring for the shared deregistration step.
pub(crate) fn deregister_handle(state: &AppState, id: u64) {
    state.handles.lock().expect("handles mutex poisoned").remove(&id);
}
