//! Request handlers for the Monte Carlo control surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::config::SimulationConfig;
use crate::error::{NotFoundError, ValidationError};
use crate::experiment::anova::two_way_anova;
use crate::experiment::series::sample_aggregate_series;
use crate::experiment::{self, ExecutionHandle, Experiment, ExperimentRequest, ExperimentStatus};
use crate::replica::run_replica;

use super::types::{
    ConfigurationResponse, CreateConfigurationRequest, ErrorResponse, PageQuery, ProgressResponse,
    SeriesQuery, SimulationRunResponse, StartExperimentRequest,
};
use super::AppState;

fn not_found(err: NotFoundError) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(err.to_string())))
}

fn unprocessable(errors: Vec<ValidationError>) -> (StatusCode, Json<ErrorResponse>) {
    let message = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse::new(message)))
}

/// `POST /v1/simulation/run` → 200 + [`SimulationRunResponse`], 422 on an
/// invalid configuration.
pub async fn run_simulation(
    Json(config): Json<SimulationConfig>,
) -> Result<Json<SimulationRunResponse>, (StatusCode, Json<ErrorResponse>)> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(unprocessable(errors));
    }

    let outcome = run_simulation_blocking(config).await;
    match outcome.result {
        Ok((kpis, series)) => Ok(Json(SimulationRunResponse {
            kpis,
            series: series.unwrap_or_default(),
        })),
        Err(failure) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(failure.to_string())),
        )),
    }
}

async fn run_simulation_blocking(config: SimulationConfig) -> crate::replica::ReplicaOutcome {
    tokio::task::spawn_blocking(move || run_replica(&config, 1, true))
        .await
        .expect("single-simulation task panicked")
}

/// `GET /v1/configurations` → 200 + `Vec<ConfigurationResponse>`.
pub async fn list_configurations(State(state): State<Arc<AppState>>) -> Json<Vec<ConfigurationResponse>> {
    Json(
        state
            .config_store
            .list()
            .into_iter()
            .map(ConfigurationResponse::from)
            .collect(),
    )
}

/// `POST /v1/configurations` → 201 + [`ConfigurationResponse`], 422 on an
/// invalid configuration body.
pub async fn create_configuration(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateConfigurationRequest>,
) -> Result<(StatusCode, Json<ConfigurationResponse>), (StatusCode, Json<ErrorResponse>)> {
    let errors = body.config.validate();
    if !errors.is_empty() {
        return Err(unprocessable(errors));
    }
    let id = state.config_store.insert(body.name, body.config);
    let record = state.config_store.get(id).map_err(not_found)?;
    Ok((StatusCode::CREATED, Json(ConfigurationResponse::from(record))))
}

/// `GET /v1/configurations/{id}` → 200 + [`ConfigurationResponse`], 404 if
/// unknown.
pub async fn get_configuration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<ConfigurationResponse>, (StatusCode, Json<ErrorResponse>)> {
    let record = state.config_store.get(id).map_err(not_found)?;
    Ok(Json(ConfigurationResponse::from(record)))
}

/// `DELETE /v1/configurations/{id}` → 204, 404 if unknown.
pub async fn delete_configuration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state.config_store.delete(id).map_err(not_found)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/monte-carlo/start` → 201 + the pending [`Experiment`] record,
/// 404 if `configuracion_id` does not resolve, 422 on out-of-range
/// replica/worker counts.
///
/// Starts execution in the background via `tokio::task::spawn_blocking` so
/// the worker pool never runs on the async event loop; the handler returns
/// as soon as the record is created.
pub async fn start_experiment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartExperimentRequest>,
) -> Result<(StatusCode, Json<Experiment>), (StatusCode, Json<ErrorResponse>)> {
    let record = state.config_store.get(body.configuracion_id).map_err(not_found)?;

    let request = ExperimentRequest {
        name: body.nombre,
        seed_base: record.config.seed,
        config: record.config,
        num_replicas: body.num_replicas,
        max_workers: body.max_workers,
    };

    let id = experiment::create_experiment(state.experiment_store.as_ref(), request)
        .map_err(unprocessable)?;

    let handle = ExecutionHandle::new();
    state
        .handles
        .lock()
        .expect("handles mutex poisoned")
        .insert(id, handle.clone());

    let store = Arc::clone(&state.experiment_store);
    let background_state = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = experiment::execute(store.as_ref(), id, &handle) {
            eprintln!("experiment {id} executor failure: {e}");
        }
        super::deregister_handle(&background_state, id);
    });

    let experiment = state.experiment_store.get(id).map_err(not_found)?;
    Ok((StatusCode::CREATED, Json(experiment)))
}

/// `GET /v1/monte-carlo/experiments` → 200 + paginated `Vec<Experiment>`,
/// most recently created first.
pub async fn list_experiments(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Json<Vec<Experiment>> {
    let skip = page.skip.unwrap_or(0);
    let limit = page.limit.unwrap_or(20);
    let experiments = state.experiment_store.list();
    Json(experiments.into_iter().skip(skip).take(limit).collect())
}

/// `GET /v1/monte-carlo/experiments/{id}` → 200 + the full [`Experiment`]
/// with embedded replicas, 404 if unknown.
pub async fn get_experiment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Experiment>, (StatusCode, Json<ErrorResponse>)> {
    let experiment = state.experiment_store.get(id).map_err(not_found)?;
    Ok(Json(experiment))
}

/// `GET /v1/monte-carlo/experiments/{id}/progress` → 200 +
/// [`ProgressResponse`], 404 if unknown.
///
/// While an execution handle is registered for `id`, reports live
/// completion counts from that handle rather than the last value the
/// executor persisted, since the persisted record only updates once at
/// the very end of a run.
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<ProgressResponse>, (StatusCode, Json<ErrorResponse>)> {
    let experiment = state.experiment_store.get(id).map_err(not_found)?;

    let live_handle = state.handles.lock().expect("handles mutex poisoned").get(&id).cloned();

    let (completed, progreso, elapsed_secs, estimated_remaining_secs) =
        match (&live_handle, experiment.status) {
            (Some(handle), ExperimentStatus::Running) => {
                let done = handle.completed.load(std::sync::atomic::Ordering::Relaxed);
                let progreso = (100 * done as u64 / experiment.num_replicas.max(1) as u64).min(100) as u32;
                let elapsed = experiment
                    .started_at_unix_ms
                    .map(|started| now_unix_ms().saturating_sub(started) as f64 / 1000.0)
                    .unwrap_or(0.0);
                let remaining = experiment::estimate_remaining(
                    std::time::Duration::from_secs_f64(elapsed),
                    done,
                    experiment.num_replicas,
                )
                .map(|d| d.as_secs_f64());
                (done, progreso, elapsed, remaining)
            }
            _ => (
                experiment.replicas.len() as u32,
                experiment.progress_pct as u32,
                experiment.duration_secs.unwrap_or(0.0),
                None,
            ),
        };

    Ok(Json(ProgressResponse {
        experiment_id: experiment.id,
        status: experiment.status,
        progreso,
        replicas_completadas: completed,
        replicas_totales: experiment.num_replicas,
        tiempo_transcurrido_segundos: elapsed_secs,
        tiempo_estimado_restante_segundos: estimated_remaining_secs,
    }))
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// `DELETE /v1/monte-carlo/experiments/{id}`.
///
/// If the experiment has a live execution handle, requests cancellation —
/// the background task (the sole writer while it runs) observes the
/// signal and transitions the record to `failed` itself, so this handler
/// does not write to the store for a running experiment. Otherwise the
/// record (and its replicas) is deleted outright.
pub async fn delete_experiment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let live_handle = state.handles.lock().expect("handles mutex poisoned").get(&id).cloned();
    if let Some(handle) = live_handle {
        handle.cancel();
        return Ok(StatusCode::ACCEPTED);
    }
    state.experiment_store.delete(id).map_err(not_found)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/monte-carlo/experiments/{id}/replicas` → 200 + completed
/// replicas with per-replica KPIs, 404 if unknown.
pub async fn get_replicas(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<crate::experiment::ReplicaRecord>>, (StatusCode, Json<ErrorResponse>)> {
    let experiment = state.experiment_store.get(id).map_err(not_found)?;
    Ok(Json(
        experiment.replicas.into_iter().filter(|r| r.completed).collect(),
    ))
}

/// `GET /v1/monte-carlo/experiments/{id}/anova` → 200 + `AnovaResult`, 404
/// if unknown, 412 if the experiment is not completed or its replicas
/// don't span at least 2 levels of each factor.
///
/// A single experiment has exactly one configuration, so its own
/// `capacity_level`/`disruption_level` never varies — this endpoint can
/// only succeed when called against replicas whose factor levels were
/// artificially diversified upstream. In practice the two-level
/// requirement is satisfied by pooling across a factorial sweep (see
/// `experiment::run_factorial_sweep` / `anova_rows_from_sweep`), not by a
/// single experiment in isolation; see `DESIGN.md`.
pub async fn get_anova(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<crate::experiment::anova::AnovaResult>, (StatusCode, Json<ErrorResponse>)> {
    let experiment = state.experiment_store.get(id).map_err(not_found)?;
    if experiment.status != ExperimentStatus::Completed {
        return Err((
            StatusCode::PRECONDITION_FAILED,
            Json(ErrorResponse::new("experiment is not in a completed state")),
        ));
    }
    let rows = experiment.anova_rows();
    let result = two_way_anova(&rows).map_err(|e| {
        (StatusCode::PRECONDITION_FAILED, Json(ErrorResponse::new(e.to_string())))
    })?;
    Ok(Json(result))
}

/// `GET /v1/monte-carlo/experiments/{id}/series-temporales?num_muestras=N`
/// → 200 + aggregate-across-replicas daily time series, 404 if unknown.
pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<Vec<crate::experiment::series::SeriesAggregatePoint>>, (StatusCode, Json<ErrorResponse>)> {
    let experiment = state.experiment_store.get(id).map_err(not_found)?;
    let num_muestras = query.num_muestras.unwrap_or(50);
    let config = experiment.config.clone();
    let seed_base = experiment.seed_base;
    let series =
        tokio::task::spawn_blocking(move || sample_aggregate_series(&config, seed_base, num_muestras))
            .await
            .expect("series sampling task panicked");
    Ok(Json(series))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;

    fn make_test_state() -> Arc<AppState> {
        AppState::new()
    }

    #[tokio::test]
    async fn run_simulation_returns_kpis_and_series() {
        let state = make_test_state();
        let app = router(state);

        let config = SimulationConfig {
            simulation_days: 10,
            ..SimulationConfig::baseline()
        };
        let req = Request::builder()
            .method("POST")
            .uri("/v1/simulation/run")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&config).unwrap()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("kpis").is_some());
        assert_eq!(json["series"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn run_simulation_invalid_config_returns_422() {
        let state = make_test_state();
        let app = router(state);

        let mut config = SimulationConfig::baseline();
        config.capacity_tm = -1.0;
        let req = Request::builder()
            .method("POST")
            .uri("/v1/simulation/run")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&config).unwrap()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn configurations_round_trip() {
        let state = make_test_state();
        let app = router(state);

        let list_req = Request::builder()
            .uri("/v1/configurations")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(list_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 1, "seeded with one baseline configuration");

        let get_req = Request::builder()
            .uri("/v1/configurations/1")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(get_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let missing_req = Request::builder()
            .uri("/v1/configurations/999")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(missing_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_experiment_rejects_unknown_configuration() {
        let state = make_test_state();
        let app = router(state);

        let body = serde_json::json!({
            "configuracion_id": 999,
            "num_replicas": 100,
            "max_workers": 2,
        });
        let req = Request::builder()
            .method("POST")
            .uri("/v1/monte-carlo/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_experiment_rejects_out_of_range_replicas() {
        let state = make_test_state();
        let app = router(state);

        let body = serde_json::json!({
            "configuracion_id": 1,
            "num_replicas": 1,
            "max_workers": 2,
        });
        let req = Request::builder()
            .method("POST")
            .uri("/v1/monte-carlo/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn experiment_lifecycle_runs_to_completion() {
        let state = make_test_state();
        let app = router(state);

        let body = serde_json::json!({
            "configuracion_id": 1,
            "num_replicas": 100,
            "max_workers": 2,
        });
        let req = Request::builder()
            .method("POST")
            .uri("/v1/monte-carlo/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = created["id"].as_u64().unwrap();

        for _ in 0..200 {
            let req = Request::builder()
                .uri(format!("/v1/monte-carlo/experiments/{id}"))
                .body(Body::empty())
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            if json["status"] == "completed" {
                assert_eq!(json["replicas"].as_array().unwrap().len(), 100);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("experiment did not complete in time");
    }

    #[tokio::test]
    async fn progress_tracks_live_completion_not_just_the_terminal_value() {
        let state = make_test_state();
        let app = router(state);

        let body = serde_json::json!({
            "configuracion_id": 1,
            "num_replicas": 2000,
            "max_workers": 1,
        });
        let req = Request::builder()
            .method("POST")
            .uri("/v1/monte-carlo/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = created["id"].as_u64().unwrap();

        let mut saw_partial_progress = false;
        let mut last_progreso = 0u64;
        loop {
            let req = Request::builder()
                .uri(format!("/v1/monte-carlo/experiments/{id}/progress"))
                .body(Body::empty())
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            let progreso = json["progreso"].as_u64().unwrap();
            assert!(progreso >= last_progreso, "progreso must not decrease");
            last_progreso = progreso;
            if json["status"] == "running" && progreso > 0 && progreso < 100 {
                saw_partial_progress = true;
            }
            if json["status"] == "completed" {
                assert_eq!(progreso, 100);
                break;
            }
        }
        assert!(
            saw_partial_progress,
            "progress endpoint should report a live in-between value while running, not jump 0 -> 100"
        );
    }

    #[tokio::test]
    async fn anova_requires_completed_status() {
        let state = make_test_state();
        let app = router(state);

        let body = serde_json::json!({
            "configuracion_id": 1,
            "num_replicas": 100,
            "max_workers": 2,
        });
        let req = Request::builder()
            .method("POST")
            .uri("/v1/monte-carlo/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = created["id"].as_u64().unwrap();

        let req = Request::builder()
            .uri(format!("/v1/monte-carlo/experiments/{id}/anova"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    }
}
