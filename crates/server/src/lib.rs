//! Thin HTTP surface over the pipeline: project and artifact listing,
//! remote step triggering, and Prometheus-style metrics. All pipeline work
//! runs on blocking threads; this crate only routes and serializes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use snowflake_adapters::LlmDispatcher;
use snowflake_core::artifact::{ArtifactError, ArtifactStore, ProjectState};
use snowflake_core::config::Config;
use snowflake_core::generate::FallbackGenerator;
use snowflake_core::logging::StdoutLogSink;
use snowflake_core::metrics::Metrics;
use snowflake_core::pipeline::{Pipeline, StepError, StepId};
use snowflake_core::prompts::PromptRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    config: Config,
    store: ArtifactStore,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = ArtifactStore::new(config.artifacts_root.clone());
        Self {
            config,
            store,
            metrics: Arc::new(Metrics::default()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/projects", get(list_projects))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/steps/:n", get(get_artifact))
        .route("/projects/:id/steps/:n/run", post(run_step))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Step(#[from] StepError),
    #[error("there is no step {0}; steps run 0 through 10")]
    UnknownStep(u8),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Artifact(ArtifactError::ProjectNotFound(_))
            | ApiError::Artifact(ArtifactError::ArtifactMissing { .. })
            | ApiError::UnknownStep(_) => StatusCode::NOT_FOUND,
            ApiError::Step(StepError::UnknownStep(_)) => StatusCode::NOT_FOUND,
            ApiError::Step(StepError::Artifact(ArtifactError::ProjectNotFound(_)))
            | ApiError::Step(StepError::Artifact(ArtifactError::ArtifactMissing { .. })) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Step(StepError::NoJson { .. })
            | ApiError::Step(StepError::Parse { .. })
            | ApiError::Step(StepError::Validation { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list_projects()?))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectState>, ApiError> {
    Ok(Json(state.store.load_project(&id)?))
}

async fn get_artifact(
    State(state): State<AppState>,
    Path((id, n)): Path<(String, u8)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let step = StepId::from_number(n).ok_or(ApiError::UnknownStep(n))?;
    state.store.load_project(&id)?;
    Ok(Json(state.store.read_artifact_raw(
        &id,
        step.number(),
        step.name(),
    )?))
}

#[derive(Serialize)]
struct RunResponse {
    project_id: String,
    step: u8,
    status: &'static str,
}

async fn run_step(
    State(state): State<AppState>,
    Path((id, n)): Path<(String, u8)>,
) -> Result<Json<RunResponse>, ApiError> {
    let step = StepId::from_number(n).ok_or(ApiError::UnknownStep(n))?;
    state.store.load_project(&id)?;

    // The pipeline uses blocking HTTP clients; both their construction and
    // the step run must stay off the async runtime.
    let config = state.config.clone();
    let metrics = Arc::clone(&state.metrics);
    let project_id = id.clone();
    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        let pipeline = build_pipeline(config, metrics)?;
        pipeline.run_step(&project_id, step)?;
        Ok(())
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))??;

    Ok(Json(RunResponse {
        project_id: id,
        step: n,
        status: "completed",
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

fn build_pipeline(config: Config, metrics: Arc<Metrics>) -> Result<Pipeline, ApiError> {
    let dispatcher =
        LlmDispatcher::from_config(&config).map_err(|err| ApiError::Internal(err.to_string()))?;
    let prompts = PromptRegistry::from_prompt_config(&config.prompts)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let store = ArtifactStore::new(config.artifacts_root.clone());
    let sink = Arc::new(StdoutLogSink::new());
    let generator = FallbackGenerator::new(Arc::new(dispatcher), config, metrics, sink.clone());
    Ok(Pipeline::new(store, prompts, generator, sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use snowflake_core::story::StoryBrief;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> Router {
        let mut config = Config::default();
        config.artifacts_root = dir.to_path_buf();
        router(AppState::new(config))
    }

    fn seeded_app(dir: &std::path::Path) -> Router {
        let store = ArtifactStore::new(dir);
        store
            .init_project(
                "demo",
                StoryBrief {
                    premise: "An idea.".into(),
                    ..StoryBrief::default()
                },
            )
            .unwrap();
        app(dir)
    }

    async fn status_of(router: Router, method: &str, uri: &str) -> StatusCode {
        let response = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn healthz_and_metrics_respond() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(status_of(app(dir.path()), "GET", "/healthz").await, StatusCode::OK);
        assert_eq!(status_of(app(dir.path()), "GET", "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_project_and_step_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            status_of(seeded_app(dir.path()), "GET", "/projects/nope").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(seeded_app(dir.path()), "GET", "/projects/demo/steps/11").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(seeded_app(dir.path()), "GET", "/projects/demo/steps/3").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn listed_projects_include_seeded_one() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            status_of(seeded_app(dir.path()), "GET", "/projects/demo").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(seeded_app(dir.path()), "GET", "/projects").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn run_without_providers_reports_unprocessable_content() {
        // No provider credentials: the generator falls through to the
        // generic emergency template, which step 0 cannot parse as JSON.
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            status_of(seeded_app(dir.path()), "POST", "/projects/demo/steps/0/run").await,
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
