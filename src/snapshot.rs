//! Read-only views of simulation state for the external renderer, overlay
//! and console layers. Nothing here can mutate simulation state.

use crate::agent::{Agent, AgentAction};
use crate::balancer::Tunables;
use crate::genome::Personality;
use crate::grid::FoodZone;
use crate::senses::Senses;
use crate::stats::{DiversitySummary, RunTotals};
use serde::Serialize;

/// Per-agent view for agent rendering and trail overlays.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: u64,
    pub x: u16,
    pub y: u16,
    pub color: [u8; 3],
    pub food_radius: u8,
    pub agent_radius: u8,
    pub energy: f32,
    pub personality: Personality,
    pub last_action: Option<AgentAction>,
    /// Recent positions, oldest first
    pub trail: Vec<(u16, u16)>,
}

impl AgentSnapshot {
    pub fn of(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            x: agent.x,
            y: agent.y,
            color: agent.genome.color,
            food_radius: agent.genome.food_radius,
            agent_radius: agent.genome.agent_radius,
            energy: agent.energy,
            personality: agent.genome.personality,
            last_action: agent.last_action,
            trail: agent.trail.iter().copied().collect(),
        }
    }
}

/// World-level view for stats overlays.
#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub population: usize,
    pub food: Vec<(u16, u16)>,
    pub active_zone: Option<FoodZone>,
    pub tunables: Tunables,
}

/// Heritable trait view exposed by the tooltip query. Weight tensors are
/// summarized, not dumped.
#[derive(Debug, Clone, Serialize)]
pub struct GenomeView {
    pub color: [u8; 3],
    pub food_radius: u8,
    pub agent_radius: u8,
    pub personality: Personality,
    pub metabolism: f32,
    pub controller_parameters: usize,
    pub controller_fingerprint: u64,
}

/// Full per-agent detail for the hover/pin tooltip.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInspection {
    pub id: u64,
    pub parent: Option<u64>,
    pub x: u16,
    pub y: u16,
    pub energy: f32,
    pub age: u32,
    pub offspring: u16,
    pub last_action: Option<AgentAction>,
    pub genome: GenomeView,
    /// Live sensory buffer as of the last completed tick
    pub senses: Senses,
}

impl AgentInspection {
    pub fn of(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            parent: agent.parent,
            x: agent.x,
            y: agent.y,
            energy: agent.energy,
            age: agent.age,
            offspring: agent.offspring,
            last_action: agent.last_action,
            genome: GenomeView {
                color: agent.genome.color,
                food_radius: agent.genome.food_radius,
                agent_radius: agent.genome.agent_radius,
                personality: agent.genome.personality,
                metabolism: agent.genome.metabolism,
                controller_parameters: agent.genome.weights.parameter_count(),
                controller_fingerprint: agent.genome.weights.fingerprint(),
            },
            senses: agent.senses.clone(),
        }
    }
}

/// Final aggregate statistics returned by shutdown for console reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub ticks: u64,
    pub final_population: usize,
    pub totals: RunTotals,
    pub diversity: DiversitySummary,
}

impl std::fmt::Display for FinalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Final Report ===")?;
        writeln!(f, "Ticks: {}", self.ticks)?;
        writeln!(f, "Population: {} (peak {})", self.final_population, self.totals.peak_population)?;
        writeln!(f, "Births: {}", self.totals.births)?;
        writeln!(
            f,
            "Deaths: {} (starvation {}, old age {}, crowding {}, culled {})",
            self.totals.deaths,
            self.totals.deaths_by_cause[0],
            self.totals.deaths_by_cause[1],
            self.totals.deaths_by_cause[2],
            self.totals.deaths_by_cause[3],
        )?;
        write!(f, "Diversity: {}", self.diversity)
    }
}
