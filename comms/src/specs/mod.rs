mod desired_state;

pub use desired_state::DesiredState;
