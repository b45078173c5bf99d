pub mod builder;
pub mod channels;
pub mod clock;
pub mod diagnostics;
pub mod errors;
pub mod execution;
pub mod process;
pub mod types;
