//! The trainer workflow: serve, swap, verify, serve again.

use std::time::Duration;

use log::{info, warn};

use crate::{
    OrchestratorError,
    configs::FleetConfig,
    fleet::{Fleet, ReplicaReply, UpdateDispatch},
    report::ConvergenceReport,
};

/// Parameters of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub initial_model: String,
    pub substitute_model: String,
    pub num_prompts: usize,
    pub poll_interval: Duration,
    pub convergence_timeout: Duration,
    /// Pause after each prompt round.
    pub prompt_pause: Duration,
}

impl SimulationPlan {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            initial_model: config.initial_model.clone(),
            substitute_model: config.substitute_model.clone(),
            num_prompts: config.num_prompts,
            poll_interval: config.poll_interval,
            convergence_timeout: config.convergence_timeout,
            prompt_pause: Duration::from_secs(1),
        }
    }
}

/// Everything observed during a simulation run.
#[derive(Debug)]
pub struct SimulationSummary {
    pub before: Vec<Vec<ReplicaReply>>,
    pub dispatch: UpdateDispatch,
    pub report: ConvergenceReport,
    pub synchronized: bool,
    pub after: Vec<Vec<ReplicaReply>>,
}

/// Runs the training simulation against `fleet`.
///
/// Replica failures never abort the run, they end up in the summary.
///
/// # Errors
/// Returns an `OrchestratorError` only if the update cannot be dispatched at all.
pub async fn run_training_simulation(
    fleet: &Fleet,
    plan: &SimulationPlan,
) -> Result<SimulationSummary, OrchestratorError> {
    info!(
        replicas = fleet.len(),
        initial = plan.initial_model.as_str(),
        substitute = plan.substitute_model.as_str();
        "starting training simulation"
    );

    info!("step 1: prompting with the initial model");
    let before = prompt_rounds(fleet, plan, "What is machine learning?").await;

    info!("step 2: requesting update to {}", plan.substitute_model);
    let dispatch = fleet.update_all(&plan.substitute_model).await?;
    for update in dispatch.rejected() {
        match &update.result {
            Ok(res) => warn!(url = update.url.as_str(); "update not accepted: {}", res.message),
            Err(e) => warn!(url = update.url.as_str(); "update not delivered: {e}"),
        }
    }

    let report = fleet
        .poll_until_converged(&plan.substitute_model, plan.convergence_timeout, plan.poll_interval)
        .await;
    info!("{report}");

    info!("step 3: verifying synchronization");
    let synchronized = fleet.verify_synchronization(&plan.substitute_model).await;
    if synchronized {
        info!("all replicas synchronized on {}", plan.substitute_model);
    } else {
        warn!("replicas are not synchronized");
        for (url, view) in fleet.check_all_status().await {
            match view {
                Ok(view) if !view.ready => warn!(url = url.as_str(); "no model loaded ({})", view.model_repo_id),
                Ok(view) => warn!(url = url.as_str(); "serving {}", view.model_repo_id),
                Err(e) => warn!(url = url.as_str(); "status unavailable: {e}"),
            }
        }
    }

    info!("step 4: prompting with the new model");
    let after = prompt_rounds(fleet, plan, "Explain neural networks.").await;

    info!("training simulation complete");
    Ok(SimulationSummary {
        before,
        dispatch,
        report,
        synchronized,
        after,
    })
}

async fn prompt_rounds(fleet: &Fleet, plan: &SimulationPlan, question: &str) -> Vec<Vec<ReplicaReply>> {
    let mut rounds = Vec::with_capacity(plan.num_prompts);

    for i in 1..=plan.num_prompts {
        let replies = fleet.send_to_all(&format!("Test prompt {i}: {question}")).await;
        for reply in &replies {
            if let Ok(generated) = &reply.result {
                info!(
                    url = reply.url.as_str();
                    "v{} ({})",
                    generated.model_version.map_or_else(|| "?".to_string(), |v| v.to_string()),
                    generated.model_repo_id.as_deref().unwrap_or("unknown")
                );
            }
        }
        rounds.push(replies);

        if !plan.prompt_pause.is_zero() {
            tokio::time::sleep(plan.prompt_pause).await;
        }
    }

    rounds
}
