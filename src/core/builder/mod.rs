pub(crate) mod binding;
pub mod simulation_builder;

pub use simulation_builder::{ModuleBuilder, SimulationBuilder};
