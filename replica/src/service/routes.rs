use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
};
use comms::{
    GenerateRequest, GenerateResponse, HealthResponse, MODEL_REPO_ID_HEADER, MODEL_VERSION_HEADER,
    ReadyResponse, StatusResponse, UpdateModelRequest, UpdateModelResponse,
};
use log::{debug, warn};

use super::{ApiError, ReplicaState};
use crate::backend::{GenerationParams, ModelBackend};

/// Builds the replica router around `state`.
pub fn router<B: ModelBackend>(state: ReplicaState<B>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ready", get(ready::<B>))
        .route("/status", get(status::<B>))
        .route("/generate", post(generate::<B>))
        .route("/update-model", post(update_model::<B>))
        .with_state(state)
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn ready<B: ModelBackend>(State(state): State<ReplicaState<B>>) -> (StatusCode, Json<ReadyResponse>) {
    let status = state.manager.status();

    if status.ready {
        let body = ReadyResponse {
            ready: true,
            message: None,
            model_repo_id: None,
            error: None,
        };
        return (StatusCode::OK, Json(body));
    }

    let message = if status.updating {
        "model is still loading"
    } else {
        "model failed to load"
    };

    let body = ReadyResponse {
        ready: false,
        message: Some(message.to_string()),
        model_repo_id: Some(status.repo_id),
        error: status.last_error,
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body))
}

async fn status<B: ModelBackend>(State(state): State<ReplicaState<B>>) -> Json<StatusResponse> {
    let status = state.manager.status();

    Json(StatusResponse {
        model_version: status.version,
        model_repo_id: status.repo_id,
        updating: status.updating,
        ready: status.ready,
        last_update_error: status.last_error,
    })
}

async fn generate<B: ModelBackend>(
    State(state): State<ReplicaState<B>>,
    Json(req): Json<GenerateRequest>,
) -> Result<(HeaderMap, Json<GenerateResponse>), ApiError> {
    let params = GenerationParams::from_request(&req)?;

    let generation = state
        .manager
        .infer(&req.prompt, &params)
        .await
        .inspect_err(|e| warn!("generation failed: {e}"))?;

    debug!(
        repo_id = generation.repo_id.as_str(),
        version = generation.version;
        "served generation"
    );

    let mut headers = HeaderMap::new();
    headers.insert(MODEL_VERSION_HEADER, HeaderValue::from(generation.version));
    match HeaderValue::from_str(&generation.repo_id) {
        Ok(repo_id) => {
            headers.insert(MODEL_REPO_ID_HEADER, repo_id);
        }
        Err(_) => warn!(
            repo_id = generation.repo_id.as_str();
            "repo id is not a valid header value, omitting {MODEL_REPO_ID_HEADER}"
        ),
    }

    Ok((headers, Json(GenerateResponse { text: generation.text })))
}

async fn update_model<B: ModelBackend>(
    State(state): State<ReplicaState<B>>,
    Json(req): Json<UpdateModelRequest>,
) -> (StatusCode, Json<UpdateModelResponse>) {
    let res = state.manager.request_update(&req.model_repo_id);

    if res.success {
        if let Some(publisher) = &state.publisher {
            if let Err(e) = publisher.publish(&res.requested_repo_id).await {
                warn!(
                    repo_id = res.requested_repo_id.as_str();
                    "failed to republish desired state: {e}"
                );
            }
        }
    }

    let code = if res.success {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };

    let body = UpdateModelResponse {
        success: res.success,
        requested_model_repo_id: res.requested_repo_id,
        message: res.message,
        error: res.error.map(|e| e.kind().to_string()),
    };
    (code, Json(body))
}
