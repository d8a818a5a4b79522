mod common;

use std::{collections::HashMap, sync::Arc, time::Duration};

use comms::RetryPolicy;
use futures::future::join_all;
use replica::{GenerationParams, ModelManager, UpdateRejection};
use tokio::sync::Barrier;

use common::{Gate, GatedBackend};

async fn ready_manager() -> (Arc<ModelManager<GatedBackend>>, Gate) {
    let (backend, gate) = GatedBackend::new();
    let manager = ModelManager::new(backend, "org/a", RetryPolicy::once());

    gate.release(1);
    manager.spawn_initial_load().unwrap().await.unwrap();

    (manager, gate)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn accepted_update_swaps_model_and_bumps_version() {
    let (manager, gate) = ready_manager().await;

    let res = manager.request_update("org/b");
    assert!(res.success);
    assert_eq!(res.message, "update started");
    assert!(manager.status().updating);

    gate.release(1);
    while manager.is_updating() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let status = manager.status();
    assert_eq!(status.repo_id, "org/b");
    assert_eq!(status.version, 2);
    assert!(status.last_error.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_during_load_is_rejected_and_never_applied() {
    let (manager, gate) = ready_manager().await;
    let first = manager.try_begin_update("org/b").unwrap();

    let second = manager.request_update("org/c");
    assert!(!second.success);
    assert!(second.message.contains("in progress"));
    assert_eq!(second.error, Some(UpdateRejection::InProgress));

    let same_target = manager.request_update("org/b");
    assert!(!same_target.success);

    gate.release(1);
    first.await.unwrap();

    let status = manager.status();
    assert_eq!(status.repo_id, "org/b");
    assert_eq!(status.version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_accept_exactly_one() {
    const CALLERS: usize = 16;

    let (manager, gate) = ready_manager().await;
    let barrier = Arc::new(Barrier::new(CALLERS));

    let calls = (0..CALLERS).map(|i| {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            manager.request_update(&format!("org/model-{i}"))
        })
    });

    let results: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let accepted: Vec<_> = results.iter().filter(|r| r.success).collect();
    assert_eq!(accepted.len(), 1);
    assert!(
        results
            .iter()
            .filter(|r| !r.success)
            .all(|r| r.error == Some(UpdateRejection::InProgress))
    );

    gate.release(1);
    while manager.is_updating() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(manager.status().repo_id, accepted[0].requested_repo_id);
    assert_eq!(manager.status().version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_load_keeps_serving_previous_model() {
    let (manager, gate) = ready_manager().await;
    let update = manager.try_begin_update("bad/repo").unwrap();

    gate.release(1);
    update.await.unwrap();

    let status = manager.status();
    assert_eq!(status.repo_id, "org/a");
    assert_eq!(status.version, 1);
    assert!(!status.updating);
    assert!(status.last_error.unwrap().contains("bad/repo"));

    let generation = manager.infer("still there?", &GenerationParams::default()).await.unwrap();
    assert_eq!(generation.repo_id, "org/a");
    assert_eq!(generation.version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inference_during_update_uses_pre_swap_model() {
    let (manager, gate) = ready_manager().await;
    let update = manager.try_begin_update("org/b").unwrap();

    for _ in 0..10 {
        let generation = manager.infer("hello", &GenerationParams::default()).await.unwrap();
        assert_eq!(generation.text, "org/a: hello");
        assert_eq!(generation.version, 1);
    }

    gate.release(1);
    update.await.unwrap();

    let generation = manager.infer("hello", &GenerationParams::default()).await.unwrap();
    assert_eq!(generation.text, "org/b: hello");
    assert_eq!(generation.version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn observers_only_see_committed_pairs() {
    const SWAPS: u64 = 20;

    let (manager, gate) = ready_manager().await;
    let committed: HashMap<u64, String> = std::iter::once((1, "org/a".to_string()))
        .chain((2..=SWAPS + 1).map(|v| (v, format!("org/m{v}"))))
        .collect();

    let reader = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while manager.status().version < SWAPS + 1 {
                let status = manager.status();
                seen.push((status.repo_id, status.version));

                let generation = manager.infer("x", &GenerationParams::default()).await.unwrap();
                seen.push((generation.repo_id, generation.version));
                tokio::task::yield_now().await;
            }
            seen
        })
    };

    for v in 2..=SWAPS + 1 {
        let update = manager.try_begin_update(&format!("org/m{v}")).unwrap();
        gate.release(1);
        update.await.unwrap();
    }

    let seen = reader.await.unwrap();
    for (repo_id, version) in seen {
        assert_eq!(committed[&version], repo_id, "torn pair at version {version}");
    }
    assert_eq!(manager.status().version, SWAPS + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_load_blocks_updates_until_done() {
    let (backend, gate) = GatedBackend::new();
    let manager = ModelManager::new(backend, "org/a", RetryPolicy::once());
    let initial = manager.spawn_initial_load().unwrap();

    let status = manager.status();
    assert!(status.updating);
    assert!(!status.ready);
    assert!(!manager.request_update("org/b").success);

    gate.release(1);
    initial.await.unwrap();

    assert!(manager.is_ready());
    assert_eq!(manager.status().version, 1);
}
