use anyhow::Context;
use log::info;
use orchestrator::{Fleet, FleetConfig, SimulationPlan, run_training_simulation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = FleetConfig::from_env().context("reading orchestrator configuration")?;
    info!(
        replicas = config.inference_urls.join(",").as_str(),
        shared_state = config.sync_state_file.is_some();
        "orchestrator configured"
    );

    let fleet = Fleet::from_config(&config)?;
    let plan = SimulationPlan::from_config(&config);
    let summary = run_training_simulation(&fleet, &plan).await?;

    log::debug!("{}", serde_json::to_string_pretty(&summary.report)?);
    if summary.synchronized {
        info!("fleet synchronized on {}", plan.substitute_model);
    }
    Ok(())
}
