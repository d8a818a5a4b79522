mod fleet;

pub use fleet::FleetConfig;
