//! Agent state and lifecycle: act, eat, metabolize, age, reproduce, die.

use crate::balancer::Tunables;
use crate::config::Config;
use crate::genome::Genome;
use crate::grid::Bounds;
use crate::senses::Senses;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Number of controller outputs: four moves plus stay. Eating is a
/// lifecycle phase, not an action.
pub const N_ACTIONS: usize = 5;

/// Categorical action sampled from the controller's output distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Stay,
}

impl AgentAction {
    pub const ALL: [AgentAction; N_ACTIONS] = [
        AgentAction::MoveUp,
        AgentAction::MoveDown,
        AgentAction::MoveLeft,
        AgentAction::MoveRight,
        AgentAction::Stay,
    ];

    /// Grid delta for the action.
    #[inline]
    pub fn delta(self) -> (i8, i8) {
        match self {
            AgentAction::MoveUp => (0, -1),
            AgentAction::MoveDown => (0, 1),
            AgentAction::MoveLeft => (-1, 0),
            AgentAction::MoveRight => (1, 0),
            AgentAction::Stay => (0, 0),
        }
    }

    #[inline]
    pub fn from_index(index: usize) -> AgentAction {
        Self::ALL.get(index).copied().unwrap_or(AgentAction::Stay)
    }
}

/// Why an agent died, tracked for the balancer's feedback rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathCause {
    Starvation,
    OldAge,
    Crowding,
    Culled,
}

impl DeathCause {
    pub const ALL: [DeathCause; 4] = [
        DeathCause::Starvation,
        DeathCause::OldAge,
        DeathCause::Crowding,
        DeathCause::Culled,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            DeathCause::Starvation => 0,
            DeathCause::OldAge => 1,
            DeathCause::Crowding => 2,
            DeathCause::Culled => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeathCause::Starvation => "starvation",
            DeathCause::OldAge => "old_age",
            DeathCause::Crowding => "crowding",
            DeathCause::Culled => "culled",
        }
    }
}

/// One live agent. Recurrent controller state lives in the
/// [`crate::neural::BrainBatch`], keyed by `id`.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: u64,
    pub parent: Option<u64>,
    pub x: u16,
    pub y: u16,
    pub energy: f32,
    pub age: u32,
    pub genome: Genome,
    /// Last sensory sample, for tooltip consumers
    pub senses: Senses,
    /// Past base input vectors, oldest first
    pub input_history: VecDeque<Vec<f32>>,
    /// Recent positions, oldest first, for trail overlays
    pub trail: VecDeque<(u16, u16)>,
    pub last_action: Option<AgentAction>,
    pub last_move: (i8, i8),
    pub offspring: u16,
    pub death: Option<DeathCause>,
}

impl Agent {
    pub fn new(id: u64, x: u16, y: u16, genome: Genome, energy: f32) -> Self {
        Self {
            id,
            parent: None,
            x,
            y,
            energy,
            age: 0,
            genome,
            senses: Senses::default(),
            input_history: VecDeque::new(),
            trail: VecDeque::new(),
            last_action: None,
            last_move: (0, 0),
            offspring: 0,
            death: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.death.is_none()
    }

    #[inline]
    pub fn energy_norm(&self, max_energy: f32) -> f32 {
        (self.energy / max_energy).clamp(0.0, 1.0)
    }

    /// Whether the agent's current cell is on its recent trail.
    #[inline]
    pub fn visited_here(&self) -> bool {
        self.trail.contains(&(self.x, self.y))
    }

    /// Full controller input: the base vector followed by the history
    /// window, zero-padded to a fixed width.
    pub fn controller_inputs(&self, base: &[f32], window: usize) -> Vec<f32> {
        let width = base.len() * (1 + window);
        let mut inputs = Vec::with_capacity(width);
        inputs.extend_from_slice(base);
        for old in &self.input_history {
            inputs.extend_from_slice(old);
        }
        inputs.resize(width, 0.0);
        inputs
    }

    /// Record a base input vector in the history window.
    pub fn push_history(&mut self, base: Vec<f32>, window: usize) {
        if window == 0 {
            return;
        }
        self.input_history.push_back(base);
        while self.input_history.len() > window {
            self.input_history.pop_front();
        }
    }

    /// Apply a sampled action. Moves are clamped into bounds; a blocked or
    /// degenerate move falls back to staying at idle cost. Costs scale
    /// with the genome's metabolism trait.
    pub fn apply_action(
        &mut self,
        action: AgentAction,
        bounds: &Bounds,
        taken: &HashSet<(u16, u16)>,
        block_occupied: bool,
        tunables: &Tunables,
        trail_cap: usize,
    ) {
        let scale = self.genome.metabolism;
        let (dx, dy) = action.delta();
        let (nx, ny) = bounds.clamp(self.x as i32 + dx as i32, self.y as i32 + dy as i32);

        let moved = (nx, ny) != (self.x, self.y)
            && !(block_occupied && taken.contains(&(nx, ny)));
        if moved {
            self.trail.push_back((self.x, self.y));
            while self.trail.len() > trail_cap {
                self.trail.pop_front();
            }
            self.last_move = (dx, dy);
            self.x = nx;
            self.y = ny;
            self.energy -= tunables.move_cost * scale;
        } else {
            self.energy -= tunables.idle_cost * scale;
        }
        self.last_action = Some(action);
    }

    /// Credit a successful eat, capped at the energy ceiling.
    pub fn gain_energy(&mut self, amount: f32, max_energy: f32) {
        self.energy = (self.energy + amount).min(max_energy);
    }

    /// Advance age and mark death conditions: crowding, old age,
    /// starvation, in that order.
    pub fn update(&mut self, tunables: &Tunables, max_age: u32) {
        self.age += 1;
        if self.senses.crowd > tunables.max_neighbors {
            self.death = Some(DeathCause::Crowding);
        } else if self.age >= max_age {
            self.death = Some(DeathCause::OldAge);
        } else if self.energy <= 0.0 {
            self.death = Some(DeathCause::Starvation);
        }
        if self.death.is_some() && self.energy < 0.0 {
            self.energy = 0.0;
        }
    }

    pub fn mark_culled(&mut self) {
        self.death = Some(DeathCause::Culled);
        if self.energy < 0.0 {
            self.energy = 0.0;
        }
    }

    /// Reproduction gate: enough energy and local crowding below the cap.
    pub fn can_reproduce(&self, tunables: &Tunables) -> bool {
        self.is_alive()
            && self.energy >= tunables.reproduction_threshold
            && self.senses.crowd < tunables.max_neighbors
    }

    /// Split energy with a mutated child placed at `pos`.
    ///
    /// The caller has already found a free adjacent cell; this method only
    /// performs the energy split and genome derivation, so
    /// `parent_after + child_after + birth_cost == parent_before` holds
    /// exactly.
    pub fn reproduce<R: Rng>(
        &mut self,
        child_id: u64,
        pos: (u16, u16),
        rng: &mut R,
        config: &Config,
    ) -> Agent {
        let remainder = self.energy - config.agents.birth_cost;
        let share = remainder * 0.5;
        self.energy = share;
        self.offspring += 1;

        let genome = self.genome.mutated(rng, config);
        let mut child = Agent::new(child_id, pos.0, pos.1, genome, share);
        child.parent = Some(self.id);
        child
    }
}
