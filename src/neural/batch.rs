//! Columnar batched recurrent state for the whole live population.
//!
//! Hidden and cell vectors live in `[rows, layers, hidden]` arrays indexed
//! by a stable agent-to-row map, so inference is one batched call per tick
//! instead of one call per agent. Rows of dead agents are dropped on sync;
//! newborn rows start from a perturbed copy of the parent's final state or
//! from zeros.

use super::lstm::{Architecture, ControllerWeights};
use crate::error::SimError;
use ndarray::{Array1, Array2, Array3, Axis};
use rand::Rng;
use rayon::prelude::*;
use std::collections::HashMap;

/// One live agent as seen by the batch: its id and, for newborns, the
/// parent whose recurrent state may be inherited.
#[derive(Debug, Clone, Copy)]
pub struct RosterEntry {
    pub id: u64,
    pub parent: Option<u64>,
}

/// Batched recurrent state for all live agents.
pub struct BrainBatch {
    arch: Architecture,
    rows: Vec<u64>,
    index: HashMap<u64, usize>,
    hidden: Array3<f32>,
    cell: Array3<f32>,
}

impl BrainBatch {
    pub fn new(arch: Architecture) -> Self {
        Self {
            arch,
            rows: Vec::new(),
            index: HashMap::new(),
            hidden: Array3::zeros((0, arch.layers, arch.hidden)),
            cell: Array3::zeros((0, arch.layers, arch.hidden)),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row currently assigned to an agent, if it is in the batch.
    pub fn row_of(&self, id: u64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Rebuild the batch for the current live roster.
    ///
    /// Surviving agents keep their exact state under a new row; dead agents
    /// simply stop being mapped. Newborns get a copy of the parent's final
    /// state perturbed by `state_noise` when `inherit` is set, zeros
    /// otherwise.
    pub fn sync<R: Rng>(
        &mut self,
        roster: &[RosterEntry],
        inherit: bool,
        state_noise: f32,
        rng: &mut R,
    ) {
        let n = roster.len();
        let mut hidden = Array3::zeros((n, self.arch.layers, self.arch.hidden));
        let mut cell = Array3::zeros((n, self.arch.layers, self.arch.hidden));
        let mut index = HashMap::with_capacity(n);

        for (row, entry) in roster.iter().enumerate() {
            if let Some(&old) = self.index.get(&entry.id) {
                hidden
                    .index_axis_mut(Axis(0), row)
                    .assign(&self.hidden.index_axis(Axis(0), old));
                cell.index_axis_mut(Axis(0), row)
                    .assign(&self.cell.index_axis(Axis(0), old));
            } else if inherit {
                if let Some(&parent_row) = entry.parent.and_then(|p| self.index.get(&p)) {
                    let mut h = self.hidden.index_axis(Axis(0), parent_row).to_owned();
                    let mut c = self.cell.index_axis(Axis(0), parent_row).to_owned();
                    if state_noise > 0.0 {
                        h.mapv_inplace(|v| v + rng.gen_range(-state_noise..=state_noise));
                        c.mapv_inplace(|v| v + rng.gen_range(-state_noise..=state_noise));
                    }
                    hidden.index_axis_mut(Axis(0), row).assign(&h);
                    cell.index_axis_mut(Axis(0), row).assign(&c);
                }
            }
            index.insert(entry.id, row);
        }

        self.rows = roster.iter().map(|e| e.id).collect();
        self.index = index;
        self.hidden = hidden;
        self.cell = cell;
    }

    /// One batched controller step for the whole population.
    ///
    /// `inputs` is `[rows, n_inputs]` with the same row order as the last
    /// `sync`; `weights[i]` is row i's genome weights. Returns the
    /// `[rows, n_actions]` action distributions and updates the recurrent
    /// state in place. Shape disagreements are fatal bookkeeping bugs and
    /// leave the state untouched. Zero live agents yields an empty batch
    /// without error.
    pub fn step(
        &mut self,
        inputs: &Array2<f32>,
        weights: &[&ControllerWeights],
    ) -> Result<Array2<f32>, SimError> {
        let n = self.rows.len();
        if inputs.nrows() != n || weights.len() != n {
            return Err(SimError::BatchMismatch {
                inputs: inputs.nrows(),
                weights: weights.len(),
                rows: n,
            });
        }
        if n == 0 {
            return Ok(Array2::zeros((0, self.arch.n_actions)));
        }
        if inputs.ncols() != self.arch.n_inputs {
            return Err(SimError::InputWidth {
                expected: self.arch.n_inputs,
                found: inputs.ncols(),
            });
        }

        let hidden = &self.hidden;
        let cell = &self.cell;
        let results: Vec<(Array1<f32>, Array2<f32>, Array2<f32>)> = (0..n)
            .into_par_iter()
            .map(|row| {
                let mut h = hidden.index_axis(Axis(0), row).to_owned();
                let mut c = cell.index_axis(Axis(0), row).to_owned();
                let probs = weights[row].step(inputs.row(row), &mut h, &mut c);
                (probs, h, c)
            })
            .collect();

        let mut out = Array2::zeros((n, self.arch.n_actions));
        for (row, (probs, h, c)) in results.into_iter().enumerate() {
            out.row_mut(row).assign(&probs);
            self.hidden.index_axis_mut(Axis(0), row).assign(&h);
            self.cell.index_axis_mut(Axis(0), row).assign(&c);
        }
        Ok(out)
    }
}
