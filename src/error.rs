//! Error taxonomy for the simulation core.

use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Extinction is deliberately absent: a dead world is a terminal status
/// reported through [`crate::sim::TickOutcome`], not a failure.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration detected at startup. Fatal, never recovered
    /// mid-run.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A placement outside the grid extents. Recovered internally by
    /// clamping or by the silent reproduction-failure path; only
    /// [`crate::grid::SpatialIndex::place`] surfaces it.
    #[error("position ({x}, {y}) outside {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u16,
        height: u16,
    },

    /// Controller batch bookkeeping no longer matches the live roster.
    /// Fatal: this is an internal invariant violation, not a runtime
    /// condition.
    #[error("controller batch mismatch: {inputs} input rows, {weights} weight sets, {rows} state rows")]
    BatchMismatch {
        inputs: usize,
        weights: usize,
        rows: usize,
    },

    /// Controller input vectors have the wrong width for the configured
    /// architecture. Fatal for the same reason as `BatchMismatch`.
    #[error("controller input width {found}, expected {expected}")]
    InputWidth { expected: usize, found: usize },
}
