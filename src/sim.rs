//! Simulation loop: one tick at a time, the full population in lockstep.
//!
//! Tick order: rebuild indices, parallel sensing (reading the grid as of
//! the end of the previous tick), one batched controller step, action
//! application, eat resolution, metabolism and deaths, reproduction,
//! balancer feedback, food regrowth, stats. All fallible work happens
//! before the first state mutation, so a failed tick leaves the previous
//! tick's state intact.

use crate::agent::{Agent, AgentAction, DeathCause};
use crate::balancer::{PopulationBalancer, Tunables};
use crate::config::Config;
use crate::error::SimError;
use crate::genome::{architecture, Genome};
use crate::grid::{Bounds, FoodField, SpatialIndex};
use crate::neural::{BrainBatch, ControllerWeights, RosterEntry};
use crate::senses::Senses;
use crate::snapshot::{AgentInspection, AgentSnapshot, FinalReport, WorldSnapshot};
use crate::stats::{DiversitySummary, RunTotals, Stats, StatsHistory};
use log::warn;
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Status of a completed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    /// Population reached zero. Terminal; the caller decides whether to
    /// stop or reseed.
    Extinct,
}

/// The simulation world and everything it owns.
pub struct Simulation {
    config: Config,
    bounds: Bounds,
    agents: Vec<Agent>,
    by_id: HashMap<u64, usize>,
    index: SpatialIndex,
    food: FoodField,
    balancer: PopulationBalancer,
    brains: BrainBatch,
    stats: Stats,
    history: StatsHistory,
    totals: RunTotals,
    tick: u64,
    next_id: u64,
    rng: ChaCha8Rng,
    seed: u64,
    paused: bool,
}

impl Simulation {
    /// Create a world with a random seed.
    pub fn new(config: Config) -> Result<Self, SimError> {
        let seed = rand::thread_rng().gen();
        Self::new_with_seed(config, seed)
    }

    /// Create a world with a specific seed for reproducibility.
    pub fn new_with_seed(config: Config, seed: u64) -> Result<Self, SimError> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bounds = Bounds::new(config.world.width, config.world.height);
        let balancer = PopulationBalancer::new(&config);
        let mut food = FoodField::new(bounds, config.world.regrowth_delay);

        // Seed agents inside the active food zone, like food itself.
        let (x_lo, x_hi, y_lo, y_hi) = balancer
            .active_zone()
            .map(|z| z.cell_rect(&bounds))
            .unwrap_or((0, bounds.width, 0, bounds.height));
        let mut agents = Vec::with_capacity(config.world.initial_population);
        let mut occupied: HashSet<(u16, u16)> = HashSet::new();
        for id in 0..config.world.initial_population as u64 {
            let mut cell = (rng.gen_range(x_lo..x_hi), rng.gen_range(y_lo..y_hi));
            for _ in 0..50 {
                if !occupied.contains(&cell) {
                    break;
                }
                cell = (rng.gen_range(x_lo..x_hi), rng.gen_range(y_lo..y_hi));
            }
            occupied.insert(cell);
            let genome = Genome::random(&mut rng, &config);
            agents.push(Agent::new(
                id,
                cell.0,
                cell.1,
                genome,
                config.agents.initial_energy,
            ));
        }

        if let Some(zone) = balancer.active_zone() {
            food.seed(zone, config.world.initial_food_density, &occupied, &mut rng);
        }

        let mut brains = BrainBatch::new(architecture(&config));
        let roster: Vec<RosterEntry> = agents
            .iter()
            .map(|a| RosterEntry {
                id: a.id,
                parent: None,
            })
            .collect();
        brains.sync(&roster, false, 0.0, &mut rng);

        let next_id = agents.len() as u64;
        let mut totals = RunTotals::default();
        totals.observe_population(agents.len());

        let mut sim = Self {
            bounds,
            agents,
            by_id: HashMap::new(),
            index: SpatialIndex::new(bounds),
            food,
            balancer,
            brains,
            stats: Stats::new(),
            history: StatsHistory::new(config.logging.stats_interval),
            totals,
            tick: 0,
            next_id,
            rng,
            seed,
            paused: false,
            config,
        };
        sim.rebuild_index();
        Ok(sim)
    }

    /// Advance the world by one tick.
    pub fn step(&mut self) -> Result<TickOutcome, SimError> {
        if self.paused {
            return Ok(TickOutcome::Running);
        }
        if self.agents.is_empty() {
            return Ok(TickOutcome::Extinct);
        }

        let tunables = *self.balancer.tunables();
        let signals = self.balancer.signals();
        let window = self.config.neural.history;
        let max_energy = self.config.agents.max_energy;
        let crowd_radius = self.config.world.crowd_radius;
        let bounds = self.bounds;

        // Phase 1: occupancy and id indices for this tick. Positions are
        // unchanged since the end of the last tick.
        self.rebuild_index();

        // Phase 2: parallel sensing, pure reads.
        let sensed: Vec<Senses> = {
            let agents = &self.agents;
            let food = &self.food;
            let index = &self.index;
            let by_id = &self.by_id;
            agents
                .par_iter()
                .map(|a| {
                    Senses::perceive(a, food, index, agents, by_id, &bounds, crowd_radius, max_energy)
                })
                .collect()
        };
        let base_inputs: Vec<Vec<f32>> = self
            .agents
            .par_iter()
            .zip(sensed.par_iter())
            .map(|(a, s)| {
                s.to_inputs(
                    a.genome.personality,
                    a.energy_norm(max_energy),
                    a.visited_here(),
                    a.last_move,
                    &signals,
                )
            })
            .collect();

        // Phase 3: one batched controller step for the whole population.
        let n_inputs = self.config.controller_inputs();
        let mut flat = Vec::with_capacity(self.agents.len() * n_inputs);
        for (agent, base) in self.agents.iter().zip(&base_inputs) {
            flat.extend(agent.controller_inputs(base, window));
        }
        let found = flat.len() / self.agents.len().max(1);
        let inputs = Array2::from_shape_vec((self.agents.len(), n_inputs), flat)
            .map_err(|_| SimError::InputWidth {
                expected: n_inputs,
                found,
            })?;
        let roster: Vec<RosterEntry> = self
            .agents
            .iter()
            .map(|a| RosterEntry {
                id: a.id,
                parent: a.parent,
            })
            .collect();
        self.brains.sync(
            &roster,
            self.config.neural.inherit_state,
            self.config.neural.state_noise,
            &mut self.rng,
        );
        let weights: Vec<&ControllerWeights> =
            self.agents.iter().map(|a| &a.genome.weights).collect();
        let probs = self.brains.step(&inputs, &weights)?;
        drop(weights);

        // Phase 4: commit sensory buffers and input history.
        for ((agent, senses), base) in self.agents.iter_mut().zip(sensed).zip(base_inputs) {
            agent.senses = senses;
            agent.push_history(base, window);
        }

        // Phase 5: sample and apply actions in id order. A cell vacated
        // this tick stays claimed until the next one.
        let block = self.config.world.block_occupied;
        let trail_cap = self.config.agents.trail_length;
        let mut taken: HashSet<(u16, u16)> = self.agents.iter().map(|a| (a.x, a.y)).collect();
        for (row, agent) in self.agents.iter_mut().enumerate() {
            let action = sample_action(probs.row(row), &mut self.rng);
            agent.apply_action(action, &bounds, &taken, block, &tunables, trail_cap);
            taken.insert((agent.x, agent.y));
        }

        // Phase 6: eat attempts; one deterministic winner per contested
        // cell.
        let mut claims: HashMap<(u16, u16), Vec<u64>> = HashMap::new();
        for agent in &self.agents {
            if self.food.has_food(agent.x, agent.y) {
                claims.entry((agent.x, agent.y)).or_default().push(agent.id);
            }
        }
        let food_energy = self.config.agents.food_energy;
        for ((x, y), ids) in claims {
            if let Some(winner) = self.food.resolve_eat(x, y, &ids) {
                if let Some(&idx) = self.by_id.get(&winner) {
                    self.agents[idx].gain_energy(food_energy, max_energy);
                }
            }
        }

        // Phase 7: aging, metabolism outcomes, death marks, removal.
        let max_age = self.config.agents.max_age;
        for agent in &mut self.agents {
            agent.update(&tunables, max_age);
        }
        let mut deaths = self.remove_dead();

        // Phase 8: reproduction.
        let births = self.handle_reproduction(&tunables);

        // Phase 9: balancer feedback on this tick's statistics.
        let crowding_index = if self.agents.is_empty() {
            0.0
        } else {
            self.agents.iter().map(|a| a.senses.crowd as f32).sum::<f32>()
                / self.agents.len() as f32
        };
        let outcome = self.balancer.balance(
            self.tick,
            self.agents.len(),
            births,
            deaths.iter().sum(),
            crowding_index,
            &mut self.rng,
        );
        if outcome.cull > 0 {
            deaths[DeathCause::Culled.index()] += self.apply_cull(outcome.cull);
        }
        if outcome.zone_rotated {
            if let Some(zone) = self.balancer.active_zone() {
                self.food.clear_outside(zone);
            }
        }

        // Phase 10: food regrowth at the freshly tuned spawn rate.
        let spawn_rate = self.balancer.tunables().food_spawn_rate;
        let occupied: HashSet<(u16, u16)> = self.agents.iter().map(|a| (a.x, a.y)).collect();
        if let Some(zone) = self.balancer.active_zone() {
            self.food.regrow(zone, spawn_rate, &occupied, &mut self.rng);
        }

        // Phase 11: stats and tick advance.
        self.totals.record_births(births);
        self.totals.observe_population(self.agents.len());
        self.stats
            .update(self.tick, &self.agents, self.food.count(), births, &deaths);
        if self.tick % self.history.interval == 0 {
            self.history.record(self.stats.clone());
        }
        self.tick += 1;

        if self.agents.is_empty() {
            warn!("population extinct at tick {}", self.tick);
            return Ok(TickOutcome::Extinct);
        }
        Ok(TickOutcome::Running)
    }

    /// Run up to `ticks` ticks, stopping early on extinction.
    pub fn run(&mut self, ticks: u64) -> Result<TickOutcome, SimError> {
        for _ in 0..ticks {
            if self.step()? == TickOutcome::Extinct {
                return Ok(TickOutcome::Extinct);
            }
        }
        Ok(TickOutcome::Running)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        self.by_id.clear();
        for (i, agent) in self.agents.iter().enumerate() {
            // Agent positions are clamped into bounds on every move.
            self.index
                .place(agent.id, agent.x as i32, agent.y as i32)
                .ok();
            self.by_id.insert(agent.id, i);
        }
    }

    /// Drop dead agents and return this tick's death tally by cause.
    fn remove_dead(&mut self) -> [usize; 4] {
        let mut tally = [0usize; 4];
        for agent in &self.agents {
            if let Some(cause) = agent.death {
                tally[cause.index()] += 1;
                self.balancer.record_death(cause);
                self.totals.record_death(cause);
            }
        }
        self.agents.retain(|a| a.is_alive());
        tally
    }

    /// Reproduction pass, candidates in ascending id order. A parent with
    /// no free adjacent cell silently fails with no energy change.
    fn handle_reproduction(&mut self, tunables: &Tunables) -> usize {
        let mut taken: HashSet<(u16, u16)> = self.agents.iter().map(|a| (a.x, a.y)).collect();
        let mut newborns: Vec<Agent> = Vec::new();

        for i in 0..self.agents.len() {
            if self.agents.len() + newborns.len() >= tunables.max_population {
                break;
            }
            if !self.agents[i].can_reproduce(tunables) {
                continue;
            }
            let (px, py) = (self.agents[i].x, self.agents[i].y);
            let mut free: Vec<(u16, u16)> = Vec::new();
            for (dx, dy) in [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
                let (nx, ny) = (px as i32 + dx, py as i32 + dy);
                if !self.bounds.contains(nx, ny) {
                    continue;
                }
                let cell = (nx as u16, ny as u16);
                if !taken.contains(&cell) && !self.food.has_food(cell.0, cell.1) {
                    free.push(cell);
                }
            }
            let Some(&cell) = free.choose(&mut self.rng) else {
                continue;
            };
            let child_id = self.next_id;
            self.next_id += 1;
            let child = self.agents[i].reproduce(child_id, cell, &mut self.rng, &self.config);
            taken.insert(cell);
            newborns.push(child);
        }

        let births = newborns.len();
        self.agents.extend(newborns);
        births
    }

    /// Cull the oldest agents (ties broken by lower id) on balancer
    /// request.
    fn apply_cull(&mut self, count: usize) -> usize {
        let mut order: Vec<usize> = (0..self.agents.len()).collect();
        order.sort_by(|&a, &b| {
            self.agents[b]
                .age
                .cmp(&self.agents[a].age)
                .then(self.agents[a].id.cmp(&self.agents[b].id))
        });
        let n = count.min(order.len());
        for &idx in order.iter().take(n) {
            self.agents[idx].mark_culled();
            self.balancer.record_death(DeathCause::Culled);
            self.totals.record_death(DeathCause::Culled);
        }
        self.agents.retain(|a| a.is_alive());
        n
    }

    // --- Lifecycle controls ---

    /// Freeze the tick loop without discarding state.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stop the simulation and return the final aggregate statistics.
    pub fn shutdown(self) -> FinalReport {
        FinalReport {
            ticks: self.tick,
            final_population: self.agents.len(),
            diversity: DiversitySummary::compute(&self.agents),
            totals: self.totals,
        }
    }

    // --- Read-only queries for the renderer/overlay layer ---

    pub fn population(&self) -> usize {
        self.agents.len()
    }

    pub fn is_extinct(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn history(&self) -> &StatsHistory {
        &self.history
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tunables(&self) -> &Tunables {
        self.balancer.tunables()
    }

    /// Per-agent render snapshot for every live agent.
    pub fn agents_snapshot(&self) -> Vec<AgentSnapshot> {
        self.agents.iter().map(AgentSnapshot::of).collect()
    }

    /// Food cells and balancer tunables for stats overlays.
    pub fn world_snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            population: self.agents.len(),
            food: self.food.positions(),
            active_zone: self.balancer.active_zone().copied(),
            tunables: *self.balancer.tunables(),
        }
    }

    /// Tooltip query: the agent at a grid position, if any. With stacking
    /// enabled the lowest id wins, keeping the answer stable.
    pub fn inspect(&self, x: u16, y: u16) -> Option<AgentInspection> {
        self.agents
            .iter()
            .filter(|a| a.x == x && a.y == y)
            .min_by_key(|a| a.id)
            .map(AgentInspection::of)
    }

    #[cfg(test)]
    pub(crate) fn agents(&self) -> &[Agent] {
        &self.agents
    }
}

/// Sample a categorical action from the controller's distribution using
/// the world RNG. Inference itself stays deterministic; randomness lives
/// here, in the loop.
fn sample_action<R: Rng>(probs: ArrayView1<f32>, rng: &mut R) -> AgentAction {
    let draw: f32 = rng.gen();
    let mut acc = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        acc += p;
        if draw < acc {
            return AgentAction::from_index(i);
        }
    }
    AgentAction::Stay
}
