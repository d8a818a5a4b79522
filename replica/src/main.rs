use comms::DesiredStateStore;
use log::info;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use replica::{ModelManager, ReplicaConfig, ReplicaState, SimulatedBackend, SyncCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = ReplicaConfig::from_env()?;
    info!(
        "starting replica: initial_model={} sync_state_file={:?} republish={}",
        config.initial_model, config.sync_state_file, config.sync_republish
    );

    let backend = SimulatedBackend::new(config.sim_load_delay);
    let manager = ModelManager::new(backend, &config.initial_model, config.load_retry);
    let _initial_load = manager.spawn_initial_load()?;

    let cancel = CancellationToken::new();
    let store = config.sync_state_file.clone().map(DesiredStateStore::new);

    let sync_task = store.clone().map(|store| {
        SyncCoordinator::new(store, manager.clone(), config.sync_interval).spawn(cancel.clone())
    });

    let publisher = if config.sync_republish { store } else { None };
    let app = replica::router(ReplicaState::new(manager, publisher));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(task) = sync_task {
        task.await?;
    }

    info!("wrapping up, bye");
    Ok(())
}

async fn shutdown(cancel: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => info!("received SIGINT"),
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
