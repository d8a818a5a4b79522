#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, Response},
};
use replica::{GenerationParams, ModelBackend, ModelErr};
use tokio::sync::Semaphore;

/// Lets a test decide when each pending load is allowed to finish.
#[derive(Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn release(&self, loads: usize) {
        self.0.add_permits(loads);
    }
}

#[derive(Debug)]
pub struct GatedModel {
    pub repo_id: String,
}

/// Backend whose loads block on a `Gate`.
///
/// Ids starting with `bad/` fail with `ModelNotFound` once released, prompts
/// containing `explode` fail to generate.
pub struct GatedBackend {
    gate: Arc<Semaphore>,
}

impl GatedBackend {
    pub fn new() -> (Self, Gate) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: Arc::clone(&gate) }, Gate(gate))
    }
}

#[async_trait]
impl ModelBackend for GatedBackend {
    type Handle = GatedModel;

    async fn load(&self, repo_id: &str) -> Result<GatedModel, ModelErr> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ModelErr::Network("gate closed".into()))?;
        permit.forget();

        if repo_id.starts_with("bad/") {
            return Err(ModelErr::ModelNotFound(repo_id.to_string()));
        }

        Ok(GatedModel {
            repo_id: repo_id.to_string(),
        })
    }

    async fn infer(
        &self,
        model: &GatedModel,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, ModelErr> {
        if prompt.contains("explode") {
            return Err(ModelErr::Generation("decoder overflow".into()));
        }

        Ok(format!("{}: {prompt}", model.repo_id))
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body<T: serde::de::DeserializeOwned>(res: Response<Body>) -> T {
    let bytes = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
