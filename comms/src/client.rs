//! Typed HTTP client for a single replica.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    ClientErr,
    msg::{
        GenerateRequest, GenerateResponse, HealthResponse, MODEL_REPO_ID_HEADER,
        MODEL_VERSION_HEADER, ReadyResponse, StatusResponse, UpdateModelRequest,
        UpdateModelResponse,
    },
};

/// A `/generate` answer together with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateReply {
    pub text: String,
    pub model_version: Option<u64>,
    pub model_repo_id: Option<String>,
}

/// Talks to one replica's HTTP surface.
#[derive(Debug, Clone)]
pub struct ReplicaClient {
    base_url: String,
    http: reqwest::Client,
}

impl ReplicaClient {
    /// Creates a new `ReplicaClient`.
    ///
    /// # Arguments
    /// * `base_url` - Scheme, host and port of the replica, e.g. `http://localhost:8001`.
    /// * `timeout` - Upper bound for every single request.
    ///
    /// # Returns
    /// A new `ReplicaClient` or a `ClientErr` if the http client can't be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientErr> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, http))
    }

    /// Creates a `ReplicaClient` sharing an existing connection pool.
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Calls `GET /healthz`.
    pub async fn healthz(&self) -> Result<HealthResponse, ClientErr> {
        let res = self.http.get(self.url("/healthz")).send().await?;
        Self::decode(res).await
    }

    /// Calls `GET /ready`, a not ready replica is reported as `ready: false`.
    pub async fn ready(&self) -> Result<ReadyResponse, ClientErr> {
        let res = self.http.get(self.url("/ready")).send().await?;
        if res.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(res.json().await?);
        }

        Self::decode(res).await
    }

    /// Calls `GET /status`.
    pub async fn status(&self) -> Result<StatusResponse, ClientErr> {
        let res = self.http.get(self.url("/status")).send().await?;
        Self::decode(res).await
    }

    /// Calls `POST /generate`.
    ///
    /// # Arguments
    /// * `req` - The prompt and its sampling parameters.
    ///
    /// # Returns
    /// The generated text and the model headers, or a `ClientErr`.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateReply, ClientErr> {
        let res = self.http.post(self.url("/generate")).json(req).send().await?;

        let headers = res.headers();
        let model_version = headers
            .get(MODEL_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let model_repo_id = headers
            .get(MODEL_REPO_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body: GenerateResponse = Self::decode(res).await?;

        Ok(GenerateReply {
            text: body.text,
            model_version,
            model_repo_id,
        })
    }

    /// Calls `POST /update-model`.
    ///
    /// A `409 Conflict` is a regular rejection and comes back as an
    /// `UpdateModelResponse` with `success: false`.
    ///
    /// # Arguments
    /// * `model_repo_id` - The repository the replica should load.
    pub async fn update_model(&self, model_repo_id: &str) -> Result<UpdateModelResponse, ClientErr> {
        let req = UpdateModelRequest {
            model_repo_id: model_repo_id.to_string(),
        };
        let res = self.http.post(self.url("/update-model")).json(&req).send().await?;

        if res.status() == StatusCode::CONFLICT {
            return Ok(res.json().await?);
        }

        Self::decode(res).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Decodes a successful json body or turns any other status into a `ClientErr`.
    async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ClientErr> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ClientErr::Status {
                code: status.as_u16(),
                body,
            });
        }

        Ok(res.json().await?)
    }
}
