pub mod config;
pub(crate) mod scheduler;
pub mod simulation_engine;

// Re-export commonly used types
pub use config::{SimulationConfig, WriterPolicy};
pub use simulation_engine::{RunOutcome, Simulation, SimulationStats};
