//! Adaptive population balancer.
//!
//! Observes aggregate statistics each tick and retunes world parameters
//! (food spawn rate, crowding threshold, reproduction gate, movement costs,
//! population cap) with bounded proportional feedback, so the population
//! stays viable without collapsing into extinction or runaway growth. The
//! rule works on moving averages of the recent statistics window, never on
//! a single tick's noise.

use crate::agent::DeathCause;
use crate::config::{BalancerConfig, Config};
use crate::grid::FoodZone;
use crate::senses::GlobalSignals;
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// World parameters owned and rewritten by the balancer. Readers within
/// tick T always see the values written after tick T-1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    /// Per-cell regrowth probability inside the active food zone
    pub food_spawn_rate: f32,
    /// Crowding death threshold and reproduction gate
    pub max_neighbors: u32,
    /// Minimum energy required to reproduce
    pub reproduction_threshold: f32,
    /// Energy cost of a successful move
    pub move_cost: f32,
    /// Energy cost of staying (or a blocked move)
    pub idle_cost: f32,
    /// Soft population cap enforced through reproduction and culls
    pub max_population: usize,
}

/// What the balancer asked the simulation to do this tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceOutcome {
    /// Number of oldest agents to cull (0 when none)
    pub cull: usize,
    /// The active food zone changed; food outside it should be cleared
    pub zone_rotated: bool,
}

// Per-tick clamp on multiplicative tunable changes. The original feedback
// rule allowed 2% per 10-tick cycle; these match that effective gain at a
// once-per-tick cadence.
const STEP_LO: f32 = 0.998;
const STEP_HI: f32 = 1.002;
const POP_STEP_LO: f32 = 0.995;
const POP_STEP_HI: f32 = 1.005;

pub struct PopulationBalancer {
    cfg: BalancerConfig,
    zones: Vec<FoodZone>,
    zone_idx: usize,
    tunables: Tunables,
    // Float shadows of the integer tunables, so sub-unit feedback steps
    // accumulate instead of being lost to rounding.
    max_neighbors_f: f32,
    max_population_f: f32,
    ema_crowd: f32,
    ema_energy: f32,
    ema_old_age: f32,
    ema_density: f32,
    recent_deaths: VecDeque<DeathCause>,
    deadlock_ticks: u32,
}

impl PopulationBalancer {
    pub fn new(config: &Config) -> Self {
        let b = &config.balancer;
        let tunables = Tunables {
            food_spawn_rate: b.food_spawn_rate,
            max_neighbors: b.max_neighbors,
            reproduction_threshold: b.reproduction_threshold,
            move_cost: b.move_cost,
            idle_cost: b.move_cost * b.idle_factor,
            max_population: b.max_population,
        };
        Self {
            cfg: b.clone(),
            zones: config.world.food_zones.clone(),
            zone_idx: 0,
            tunables,
            max_neighbors_f: b.max_neighbors as f32,
            max_population_f: b.max_population as f32,
            ema_crowd: 0.0,
            ema_energy: 0.0,
            ema_old_age: 0.0,
            ema_density: 0.0,
            recent_deaths: VecDeque::with_capacity(b.death_window),
            deadlock_ticks: 0,
        }
    }

    #[inline]
    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// World-pressure signals fed back into every agent's senses.
    pub fn signals(&self) -> GlobalSignals {
        GlobalSignals {
            crowd: self.ema_crowd,
            energy: self.ema_energy,
            old_age: self.ema_old_age,
        }
    }

    /// The food zone currently receiving regrowth, if any are configured.
    pub fn active_zone(&self) -> Option<&FoodZone> {
        self.zones.get(self.zone_idx)
    }

    /// Record one death for the statistics window.
    pub fn record_death(&mut self, cause: DeathCause) {
        if self.recent_deaths.len() >= self.cfg.death_window {
            self.recent_deaths.pop_front();
        }
        self.recent_deaths.push_back(cause);
    }

    /// Run the feedback rule for one tick. `crowding_index` is the mean
    /// local agent density over the live population.
    #[allow(clippy::too_many_arguments)]
    pub fn balance<R: Rng>(
        &mut self,
        tick: u64,
        population: usize,
        births: usize,
        deaths: usize,
        crowding_index: f32,
        rng: &mut R,
    ) -> BalanceOutcome {
        let mut outcome = BalanceOutcome::default();

        if self.cfg.zone_cycle > 0
            && tick > 0
            && tick % self.cfg.zone_cycle == 0
            && self.zones.len() > 1
        {
            self.zone_idx = (self.zone_idx + 1) % self.zones.len();
            info!(
                "food zone rotated to {} ({:?}) at tick {tick}",
                self.zone_idx, self.zones[self.zone_idx]
            );
            outcome.zone_rotated = true;
        }

        self.ema_density += self.cfg.ema_alpha * (crowding_index - self.ema_density);

        if population == 0 {
            return outcome;
        }

        if self.recent_deaths.len() >= self.cfg.min_death_window {
            self.feedback_step();
        }
        self.water_marks(population, tick);
        self.deadlock_breaker(tick, rng);

        if (population as f32) > self.max_population_f * self.cfg.hard_cull_factor {
            outcome.cull = population.saturating_sub(self.tunables.max_population);
            info!(
                "hard cull at tick {tick}: population {population} over cap {}",
                self.tunables.max_population
            );
        }

        self.commit_tunables();
        debug!(
            "balance t={tick} pop={population} b={births} d={deaths} \
             ema[crowd]={:.2} ema[energy]={:.2} ema[old]={:.2} | \
             spawn={:.4} move={:.2} maxn={} maxpop={} threshold={:.1}",
            self.ema_crowd,
            self.ema_energy,
            self.ema_old_age,
            self.tunables.food_spawn_rate,
            self.tunables.move_cost,
            self.tunables.max_neighbors,
            self.tunables.max_population,
            self.tunables.reproduction_threshold,
        );
        outcome
    }

    /// Proportional feedback from the death-ratio moving averages.
    fn feedback_step(&mut self) {
        let mut crowd = 0usize;
        let mut energy = 0usize;
        let mut old_age = 0usize;
        for cause in &self.recent_deaths {
            match cause {
                DeathCause::Crowding | DeathCause::Culled => crowd += 1,
                DeathCause::Starvation => energy += 1,
                DeathCause::OldAge => old_age += 1,
            }
        }
        let total = (crowd + energy + old_age + 1) as f32;
        let alpha = self.cfg.ema_alpha;
        self.ema_crowd += alpha * (crowd as f32 / total - self.ema_crowd);
        self.ema_energy += alpha * (energy as f32 / total - self.ema_energy);
        self.ema_old_age += alpha * (old_age as f32 / total - self.ema_old_age);

        let crowd_err = self.ema_crowd - self.cfg.target_crowd_ratio;
        let energy_err = self.ema_energy - self.cfg.target_energy_ratio;

        let neighbor_change = (1.0 + crowd_err * 0.1).clamp(STEP_LO, STEP_HI);
        let spawn_change = (1.0 + energy_err * 0.1).clamp(STEP_LO, STEP_HI);
        let move_change = (1.0 + crowd_err * 0.05).clamp(STEP_LO, STEP_HI);
        let pop_change = (1.0 - crowd_err * 0.05).clamp(POP_STEP_LO, POP_STEP_HI);

        let t = &mut self.tunables;
        self.max_neighbors_f = self
            .cfg
            .max_neighbors_range
            .clamp(self.max_neighbors_f * neighbor_change);
        t.food_spawn_rate = self
            .cfg
            .spawn_rate_range
            .clamp(t.food_spawn_rate * spawn_change);
        t.move_cost = self.cfg.move_cost_range.clamp(t.move_cost * move_change);
        self.max_population_f = self
            .cfg
            .max_population_range
            .clamp(self.max_population_f * pop_change);
    }

    /// Low-water recovery support and high-water pushback.
    fn water_marks(&mut self, population: usize, tick: u64) {
        let spawn_step = (self.cfg.spawn_rate_range.max - self.cfg.spawn_rate_range.min) * 0.02;
        let move_step = (self.cfg.move_cost_range.max - self.cfg.move_cost_range.min) * 0.02;
        let t = &mut self.tunables;

        if population < self.cfg.min_population {
            t.food_spawn_rate = self.cfg.spawn_rate_range.clamp(t.food_spawn_rate + spawn_step);
            t.move_cost = self.cfg.move_cost_range.clamp(t.move_cost - move_step);
            t.reproduction_threshold = self
                .cfg
                .reproduction_threshold_range
                .clamp(t.reproduction_threshold * 0.995);
            debug!(
                "population recovery at tick {tick}: pop {population}, spawn {:.4}, threshold {:.1}",
                t.food_spawn_rate, t.reproduction_threshold
            );
        } else if population > t.max_population {
            t.food_spawn_rate = self.cfg.spawn_rate_range.clamp(t.food_spawn_rate - spawn_step);
            t.move_cost = self.cfg.move_cost_range.clamp(t.move_cost + move_step);
            t.reproduction_threshold = self
                .cfg
                .reproduction_threshold_range
                .clamp(t.reproduction_threshold * 1.005);
            debug!(
                "population pushback at tick {tick}: pop {population} over {}",
                t.max_population
            );
        }
    }

    /// Detect the all-tunables-pinned-at-worst state and break it by
    /// injecting resources, as the feedback rule alone cannot escape it.
    fn deadlock_breaker<R: Rng>(&mut self, tick: u64, rng: &mut R) {
        let b = &self.cfg;
        let pinned = self.max_neighbors_f <= b.max_neighbors_range.min + 0.6
            && self.tunables.food_spawn_rate <= b.spawn_rate_range.min + 1e-6
            && self.tunables.move_cost >= b.move_cost_range.max - 0.01
            && self.max_population_f <= b.max_population_range.min + 1.0
            && (self.ema_crowd > 0.96 || self.ema_density > 0.9 * self.max_neighbors_f);
        if pinned {
            self.deadlock_ticks += 1;
        } else {
            self.deadlock_ticks = 0;
        }
        if self.deadlock_ticks < b.deadlock_limit {
            return;
        }

        warn!("deadlock breaker at tick {tick}: resetting tunables and injecting food");
        let mid = (b.max_neighbors_range.min + b.max_neighbors_range.max) * 0.5;
        self.max_neighbors_f = rng.gen_range(mid..=b.max_neighbors_range.max);
        self.tunables.food_spawn_rate =
            rng.gen_range(b.spawn_rate_range.max * 0.5..=b.spawn_rate_range.max);
        self.tunables.move_cost = b.move_cost_range.min;
        self.max_population_f = b.max_population_range.max;
        self.ema_crowd = 0.3;
        self.deadlock_ticks = 0;
    }

    /// Round the float shadows into the published tunables and derive the
    /// idle cost.
    fn commit_tunables(&mut self) {
        self.tunables.max_neighbors = self.max_neighbors_f.round() as u32;
        self.tunables.max_population = self.max_population_f.round() as usize;
        self.tunables.idle_cost = self.tunables.move_cost * self.cfg.idle_factor;
    }

    /// Check every tunable against its configured bounds.
    pub fn tunables_in_bounds(&self) -> bool {
        let b = &self.cfg;
        let t = &self.tunables;
        b.spawn_rate_range.contains(t.food_spawn_rate)
            && b.max_neighbors_range.contains(t.max_neighbors as f32)
            && b.reproduction_threshold_range.contains(t.reproduction_threshold)
            && b.move_cost_range.contains(t.move_cost)
            && b.max_population_range.contains(t.max_population as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn balancer() -> PopulationBalancer {
        PopulationBalancer::new(&Config::default())
    }

    #[test]
    fn test_tunables_never_leave_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut b = balancer();

        // Drown the window in starvation deaths at a tiny population.
        for _ in 0..2000 {
            b.record_death(DeathCause::Starvation);
        }
        for tick in 0..3000 {
            b.balance(tick, 5, 0, 0, 0.0, &mut rng);
            assert!(b.tunables_in_bounds(), "bounds violated at tick {tick}");
        }

        // Then flood it with crowding deaths at a huge population.
        for _ in 0..2000 {
            b.record_death(DeathCause::Crowding);
        }
        for tick in 0..3000 {
            b.balance(tick, 5000, 0, 0, 30.0, &mut rng);
            assert!(b.tunables_in_bounds(), "bounds violated at tick {tick}");
        }
    }

    #[test]
    fn test_low_population_raises_spawn_rate() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut b = balancer();
        let before = b.tunables().food_spawn_rate;
        for tick in 0..50 {
            b.balance(tick, 10, 0, 0, 0.5, &mut rng);
        }
        assert!(b.tunables().food_spawn_rate > before);
        assert!(b.tunables().reproduction_threshold < 120.0);
    }

    #[test]
    fn test_overpopulation_requests_cull() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut b = balancer();
        let outcome = b.balance(1, 2000, 0, 0, 5.0, &mut rng);
        assert_eq!(outcome.cull, 2000 - b.tunables().max_population);

        let outcome = b.balance(2, 500, 0, 0, 5.0, &mut rng);
        assert_eq!(outcome.cull, 0);
    }

    #[test]
    fn test_zone_rotation_cadence() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut b = balancer();
        assert!(!b.balance(999, 100, 0, 0, 1.0, &mut rng).zone_rotated);
        assert!(b.balance(1000, 100, 0, 0, 1.0, &mut rng).zone_rotated);
        assert!(!b.balance(1001, 100, 0, 0, 1.0, &mut rng).zone_rotated);
    }

    #[test]
    fn test_deadlock_breaker_resets_tunables() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut b = balancer();
        // Pin everything at its worst bound by hand.
        b.max_neighbors_f = b.cfg.max_neighbors_range.min;
        b.tunables.food_spawn_rate = b.cfg.spawn_rate_range.min;
        b.tunables.move_cost = b.cfg.move_cost_range.max;
        b.max_population_f = b.cfg.max_population_range.min;
        b.ema_crowd = 0.99;

        for tick in 0..(b.cfg.deadlock_limit as u64 + 5) {
            b.balance(tick, 250, 0, 0, 20.0, &mut rng);
        }
        // The breaker fired: food is plentiful and movement is cheap again.
        assert!(b.tunables().food_spawn_rate >= b.cfg.spawn_rate_range.max * 0.5);
        assert!(b.tunables().move_cost <= b.cfg.move_cost_range.min + 1e-6);
        assert!(b.tunables_in_bounds());
    }

    #[test]
    fn test_death_window_is_bounded() {
        let mut b = balancer();
        for _ in 0..5000 {
            b.record_death(DeathCause::Starvation);
        }
        assert_eq!(b.recent_deaths.len(), b.cfg.death_window);
    }
}
