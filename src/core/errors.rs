use super::types::SimTime;

/// Errors raised while elaborating or running a simulation
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Port left unbound, bound twice, bound to the wrong type or a duplicate name
    Binding { target: String, reason: String },
    /// Write attempted through an input port
    WriteViolation { port: String, process: String },
    /// Delta cycles at one time instant did not reach a fixed point
    Divergence {
        time: SimTime,
        deltas: u32,
        signals: Vec<String>,
    },
    /// Index outside a memory's bounds
    OutOfRange {
        source: String,
        index: usize,
        len: usize,
    },
    /// Second process driving a single-writer signal
    MultipleDrivers {
        signal: String,
        first: String,
        second: String,
    },
    /// Handle or name lookup with the wrong value type
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    /// Suspension request the kernel cannot honour
    InvalidWait { process: String, reason: String },
    /// Invalid clock or configuration values
    Config(String),
    /// Failure reported by user process code
    Process { process: String, message: String },
}

impl SimError {
    pub fn binding(target: impl Into<String>, reason: impl Into<String>) -> Self {
        SimError::Binding {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn process(process: impl Into<String>, message: impl Into<String>) -> Self {
        SimError::Process {
            process: process.into(),
            message: message.into(),
        }
    }

    /// Whether the error aborts the run. Only out-of-range accesses are
    /// recoverable; they are downgraded to diagnostics by the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimError::OutOfRange { .. })
    }
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::Binding { target, reason } => {
                write!(f, "Binding error on '{}': {}", target, reason)
            }
            SimError::WriteViolation { port, process } => write!(
                f,
                "Write violation: process '{}' wrote through input port '{}'",
                process, port
            ),
            SimError::Divergence {
                time,
                deltas,
                signals,
            } => write!(
                f,
                "Divergence at time {}: no fixed point after {} delta cycles (still toggling: {})",
                time,
                deltas,
                signals.join(", ")
            ),
            SimError::OutOfRange { source, index, len } => write!(
                f,
                "Out of range access in '{}': index {} with length {}",
                source, index, len
            ),
            SimError::MultipleDrivers {
                signal,
                first,
                second,
            } => write!(
                f,
                "Signal '{}' is driven by '{}' and '{}'. Multiple drivers not allowed.",
                signal, first, second
            ),
            SimError::TypeMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "Type mismatch on '{}': expected {}, found {}",
                name, expected, found
            ),
            SimError::InvalidWait { process, reason } => {
                write!(f, "Invalid wait in process '{}': {}", process, reason)
            }
            SimError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SimError::Process { process, message } => {
                write!(f, "Process '{}' failed: {}", process, message)
            }
        }
    }
}

impl std::error::Error for SimError {}
