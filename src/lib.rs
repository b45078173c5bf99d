pub mod core;

// Re-export commonly used types
pub use crate::core::builder::{ModuleBuilder, SimulationBuilder};
pub use crate::core::channels::ChannelKind;
pub use crate::core::clock::{Clock, ClockSpec};
pub use crate::core::diagnostics::{Diagnostic, Severity, SimulationObserver};
pub use crate::core::errors::SimError;
pub use crate::core::execution::{RunOutcome, Simulation, SimulationConfig, SimulationStats, WriterPolicy};
pub use crate::core::process::{ProcessContext, ProcessKind, Sensitivity, Suspend, ThreadProcess};
pub use crate::core::types::{
    Direction, Edge, Fifo, Port, PortId, ProcessId, Signal, SignalHandle, SignalId, SignalRef,
    SignalValue, SimTime, Trigger,
};
