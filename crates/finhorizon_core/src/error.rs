//! Error types for the projection engine
//!
//! Mirrors the teacher crate's layered-enum style: each subsystem owns a
//! small error enum and `From` impls chain failures upward instead of
//! reaching for a single catch-all. `EngineError` is the top-level error
//! returned from `engine::run`; it also implements `std::error::Error` so
//! the crate composes with `?` in binaries that wrap it with `anyhow` or
//! `color-eyre`.

use std::fmt;

use crate::model::{AccountId, ScheduleId};

pub type Result<T> = std::result::Result<T, EngineError>;

/// Fatal or non-fatal errors raised while expanding schedules, building the
/// dependency graph, or running the segment loop (spec.md §7).
#[derive(Debug)]
pub enum EngineError {
    /// A schedule expanded past the safety cap, or otherwise violates a
    /// structural invariant (e.g. a transfer with identical `from`/`to`).
    Configuration { schedule: ScheduleId, message: String },
    /// The dependency graph contains a cycle; carries the cycle for
    /// diagnostics.
    Cycle { cycle: Vec<String> },
    /// A transfer/bill referenced an account absent from the dataset and
    /// neither side could be resolved.
    MissingReference { account: AccountId, context: String },
    /// A posting amount was non-finite (NaN/inf) after rate application.
    Arithmetic { schedule: ScheduleId, message: String },
    /// Segment construction violated the non-overlap invariant.
    OverlappingSegments,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Configuration { schedule, message } => {
                write!(f, "configuration error in schedule {schedule}: {message}")
            }
            EngineError::Cycle { cycle } => {
                write!(f, "circular dependency: {}", cycle.join(" -> "))
            }
            EngineError::MissingReference { account, context } => {
                write!(f, "missing account reference {account} ({context})")
            }
            EngineError::Arithmetic { schedule, message } => {
                write!(f, "arithmetic error in schedule {schedule}: {message}")
            }
            EngineError::OverlappingSegments => {
                write!(f, "timeline segments overlap or are not monotonic")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Non-fatal conditions surfaced as warnings rather than aborting the
/// calculation (spec.md §7: `VariableResolutionError`, `CacheFailure`,
/// and the skip-with-warning branch of `MissingReferenceError`).
#[derive(Debug, Clone)]
pub enum EngineWarning {
    VariableUnresolved { name: String, simulation: String },
    CacheFailure { key: String, message: String },
    TransferSkipped { schedule: ScheduleId, reason: String },
    BalanceBelowMinimum { account: AccountId, date: jiff::civil::Date, balance: f64, minimum: f64 },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineWarning::VariableUnresolved { name, simulation } => {
                write!(f, "variable '{name}' unresolved for simulation '{simulation}'")
            }
            EngineWarning::CacheFailure { key, message } => {
                write!(f, "cache failure for key {key}: {message}")
            }
            EngineWarning::TransferSkipped { schedule, reason } => {
                write!(f, "transfer {schedule} skipped: {reason}")
            }
            EngineWarning::BalanceBelowMinimum { account, date, balance, minimum } => {
                write!(
                    f,
                    "{account} balance {balance:.2} below minimum {minimum:.2} on {date}"
                )
            }
        }
    }
}
