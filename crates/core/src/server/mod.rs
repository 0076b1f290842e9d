use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::interpolation::EngineMode;
use crate::pipeline::Pipeline;
use crate::types::AnimationRequest;

/// Smoothness control offered to users: 2..=16 in steps of 2.
pub const MULTIPLIER_RANGE: (i64, i64) = (2, 16);
pub const MULTIPLIER_STEP: i64 = 2;
pub const FPS_RANGE: (u32, u32) = (12, 60);

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: EngineMode,
}

fn default_multiplier() -> i64 {
    2
}

fn default_fps() -> u32 {
    24
}

/// The destination is never taken from the client; the pipeline allocates it
/// under its output directory.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub images: Vec<PathBuf>,
    #[serde(default = "default_multiplier")]
    pub multiplier: i64,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub output_path: PathBuf,
    pub engine: EngineMode,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<PipelineError>() {
            Some(pipeline_err) if pipeline_err.is_validation() => {
                AppError::BadRequest(pipeline_err.to_string())
            }
            _ => AppError::Internal(format!("{err:#}")),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/render", post(render))
        .route("/api/{*path}", any(api_route_not_found))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        engine: state.pipeline().mode(),
    })
}

async fn api_route_not_found(Path(path): Path<String>) -> AppError {
    AppError::NotFound(format!("api endpoint not found: /api/{path}"))
}

fn validate_controls(request: &RenderRequest) -> Result<(), AppError> {
    let (min_m, max_m) = MULTIPLIER_RANGE;
    if !(min_m..=max_m).contains(&request.multiplier) || request.multiplier % MULTIPLIER_STEP != 0
    {
        return Err(AppError::BadRequest(format!(
            "multiplier must be an even number between {min_m} and {max_m}, got {}",
            request.multiplier
        )));
    }

    let (min_fps, max_fps) = FPS_RANGE;
    if !(min_fps..=max_fps).contains(&request.fps) {
        return Err(AppError::BadRequest(format!(
            "fps must be between {min_fps} and {max_fps}, got {}",
            request.fps
        )));
    }

    Ok(())
}

async fn render(
    State(state): State<AppState>,
    Json(body): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, AppError> {
    validate_controls(&body)?;

    let request = AnimationRequest {
        inputs: body.images,
        multiplier: body.multiplier,
        fps: body.fps,
        output: None,
    };
    info!(
        images = request.inputs.len(),
        multiplier = request.multiplier,
        fps = request.fps,
        "Render requested"
    );

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.render(&request))
        .await
        .map_err(|join_err| {
            error!(error = %join_err, "Render task did not complete");
            AppError::Internal(format!("render task failed: {join_err}"))
        })?;

    match result {
        Ok(output_path) => Ok(Json(RenderResponse {
            output_path,
            engine: state.pipeline.mode(),
        })),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Render failed");
            Err(AppError::from(err))
        }
    }
}
