pub mod configs;
pub mod error;
pub mod fleet;
pub mod report;
pub mod simulation;

pub use configs::FleetConfig;
pub use error::OrchestratorError;
pub use fleet::{Fleet, ReplicaReply, ReplicaUpdate, UpdateDispatch};
pub use report::{ConvergenceReport, ReplicaOutcome, ReplicaView};
pub use simulation::{SimulationPlan, SimulationSummary, run_training_simulation};
