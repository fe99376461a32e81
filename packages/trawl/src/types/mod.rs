//! Core data types: extracted records and run outcomes.

pub mod record;
pub mod run;

pub use record::{FieldValue, RawRecord};
pub use run::{
    ErrorKind, ErrorSummary, RunCounts, RunResult, RunStatus, WalkSummary, WalkTerminal,
};
