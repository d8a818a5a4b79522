#![allow(dead_code)]

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use comms::{DesiredStateStore, ReplicaClient, RetryPolicy};
use replica::{ModelManager, ReplicaState, SimulatedBackend, SyncCoordinator};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const LOAD_DELAY: Duration = Duration::from_millis(50);
pub const SYNC_INTERVAL: Duration = Duration::from_millis(20);

/// A replica served over real HTTP on an ephemeral loopback port.
pub struct TestReplica {
    pub url: String,
    pub manager: Arc<ModelManager<SimulatedBackend>>,
    cancel: CancellationToken,
}

impl Drop for TestReplica {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Starts a replica that finished loading `initial_model`.
///
/// With a `store` the replica also runs a sync coordinator against it.
pub async fn spawn_replica(initial_model: &str, store: Option<DesiredStateStore>) -> TestReplica {
    spawn_replica_with_delay(initial_model, store, LOAD_DELAY).await
}

pub async fn spawn_replica_with_delay(
    initial_model: &str,
    store: Option<DesiredStateStore>,
    load_delay: Duration,
) -> TestReplica {
    let manager = ModelManager::new(
        SimulatedBackend::new(load_delay),
        initial_model,
        RetryPolicy::once(),
    );
    manager.spawn_initial_load().unwrap().await.unwrap();

    let cancel = CancellationToken::new();
    if let Some(store) = store {
        SyncCoordinator::new(store, Arc::clone(&manager), SYNC_INTERVAL).spawn(cancel.clone());
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let app = replica::router(ReplicaState::new(Arc::clone(&manager), None));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    TestReplica {
        url,
        manager,
        cancel,
    }
}

/// An address nothing listens on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

pub fn client(url: &str) -> ReplicaClient {
    ReplicaClient::new(url, Duration::from_secs(5)).unwrap()
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(
        NonZeroU32::new(2).unwrap(),
        Duration::from_millis(10),
        Duration::from_millis(20),
    )
}
