//! Recurrent controller: per-genome LSTM weights and the columnar batch
//! that steps every live agent in one call per tick.

mod batch;
mod lstm;

pub use batch::{BrainBatch, RosterEntry};
pub use lstm::{Architecture, ControllerWeights, LstmLayer};
