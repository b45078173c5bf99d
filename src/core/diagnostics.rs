use super::types::SimTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Error => write!(f, "Error"),
        }
    }
}

/// One entry of the diagnostic stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Hierarchical name of the reporting module
    pub source: String,
    pub time: SimTime,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, source: &str, time: SimTime, message: impl Into<String>) -> Self {
        Self {
            severity,
            source: source.to_string(),
            time,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: ({}) @{}: {}",
            self.severity, self.source, self.time, self.message
        )
    }
}

/// Observer trait for simulation events
///
/// All methods have empty defaults so observers only implement what they need.
pub trait SimulationObserver {
    /// Called when simulated time advances
    fn on_time_advance(&mut self, _old: SimTime, _new: SimTime) {}

    /// Called after each delta-cycle commit with the names of the changed channels
    fn on_delta_complete(&mut self, _time: SimTime, _delta: u64, _changed: &[&str]) {}

    /// Called for every diagnostic reported by a process
    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) {}
}
