//! Configuration system for the vivarium simulation.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::error::SimError;
use crate::grid::FoodZone;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub world: WorldConfig,
    pub agents: AgentConfig,
    pub neural: NeuralConfig,
    pub mutation: MutationConfig,
    pub balancer: BalancerConfig,
    pub logging: LoggingConfig,
}

/// World/environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Grid width in cells
    pub width: u16,
    /// Grid height in cells
    pub height: u16,
    /// Number of agents at start
    pub initial_population: usize,
    /// Fraction of the active food zone seeded with food at startup
    pub initial_food_density: f32,
    /// Ticks a consumed cell must wait before it may regrow
    pub regrowth_delay: u32,
    /// Food zones the balancer rotates through (fractional rectangles)
    pub food_zones: Vec<FoodZone>,
    /// Radius of the fixed crowding neighborhood (Chebyshev)
    pub crowd_radius: u8,
    /// Treat a move onto an occupied cell as a stay
    pub block_occupied: bool,
}

/// Agent energy and lifespan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Starting energy for seeded agents
    pub initial_energy: f32,
    /// Energy gained per eaten food cell
    pub food_energy: f32,
    /// Hard cap on stored energy
    pub max_energy: f32,
    /// Maximum lifespan in ticks
    pub max_age: u32,
    /// Fixed energy cost of a successful reproduction
    pub birth_cost: f32,
    /// Length of the position trail kept for the renderer
    pub trail_length: usize,
}

/// Recurrent controller architecture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralConfig {
    /// Hidden units per LSTM layer
    pub hidden: usize,
    /// Number of stacked LSTM layers
    pub layers: usize,
    /// Past base input vectors appended to the controller input
    pub history: usize,
    /// Newborns inherit a perturbed copy of the parent's recurrent state
    /// (zeroed otherwise)
    pub inherit_state: bool,
    /// Perturbation magnitude applied to inherited recurrent state
    pub state_noise: f32,
}

/// Mutation rules applied when a genome is derived from a parent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Maximum per-channel color shift
    pub color_step: u8,
    /// Perception radius bounds (both food and agent radii)
    pub radius_min: u8,
    pub radius_max: u8,
    /// Probability of re-rolling the personality
    pub personality_rate: f32,
    /// Metabolism trait jitter and clamp range
    pub metabolism_jitter: f32,
    pub metabolism_min: f32,
    pub metabolism_max: f32,
    /// Per-weight mutation probability
    pub weight_rate: f32,
    /// Magnitude of individual weight perturbations
    pub weight_strength: f32,
    /// Absolute clamp applied to every controller weight
    pub weight_limit: f32,
}

/// Bounds for one balancer-owned tunable
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TunableRange {
    pub min: f32,
    pub max: f32,
}

impl TunableRange {
    /// Clamp a candidate value into the range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Population balancer targets, bounds and initial tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Desired share of deaths caused by crowding
    pub target_crowd_ratio: f32,
    /// Desired share of deaths caused by starvation
    pub target_energy_ratio: f32,
    /// Desired share of deaths caused by old age
    pub target_old_age_ratio: f32,
    /// Smoothing factor for the death-ratio moving averages
    pub ema_alpha: f32,
    /// Low-water population mark triggering recovery support
    pub min_population: usize,
    /// Deaths remembered for ratio estimation
    pub death_window: usize,
    /// Minimum recorded deaths before feedback engages
    pub min_death_window: usize,
    /// Consecutive pinned ticks before the deadlock breaker fires
    pub deadlock_limit: u32,
    /// Population overshoot factor that triggers a hard cull
    pub hard_cull_factor: f32,
    /// Ticks between food zone rotations (0 disables rotation)
    pub zone_cycle: u64,

    /// Initial tunable values
    pub food_spawn_rate: f32,
    pub max_neighbors: u32,
    pub reproduction_threshold: f32,
    pub move_cost: f32,
    /// Idle cost as a fraction of the move cost
    pub idle_factor: f32,
    pub max_population: usize,

    /// Per-tunable bounds
    pub spawn_rate_range: TunableRange,
    pub max_neighbors_range: TunableRange,
    pub reproduction_threshold_range: TunableRange,
    pub move_cost_range: TunableRange,
    pub max_population_range: TunableRange,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Ticks between stats snapshots and console summaries
    pub stats_interval: u64,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            agents: AgentConfig::default(),
            neural: NeuralConfig::default(),
            mutation: MutationConfig::default(),
            balancer: BalancerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 107,
            height: 82,
            initial_population: 160,
            initial_food_density: 0.15,
            regrowth_delay: 8,
            food_zones: vec![
                FoodZone::new(0.0, 0.5, 0.0, 1.0),
                FoodZone::new(0.0, 1.0, 0.0, 1.0),
                FoodZone::new(0.5, 1.0, 0.0, 1.0),
                FoodZone::new(0.25, 0.75, 0.25, 0.75),
            ],
            crowd_radius: 2,
            block_occupied: true,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            initial_energy: 45.0,
            food_energy: 60.0,
            max_energy: 200.0,
            max_age: 1500,
            birth_cost: 30.0,
            trail_length: 10,
        }
    }
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            hidden: 32,
            layers: 2,
            history: 2,
            inherit_state: true,
            state_noise: 0.02,
        }
    }
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            color_step: 16,
            radius_min: 1,
            radius_max: 8,
            personality_rate: 0.05,
            metabolism_jitter: 0.05,
            metabolism_min: 0.8,
            metabolism_max: 1.25,
            weight_rate: 0.10,
            weight_strength: 0.1,
            weight_limit: 5.0,
        }
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            target_crowd_ratio: 0.25,
            target_energy_ratio: 0.25,
            target_old_age_ratio: 0.15,
            ema_alpha: 0.03,
            min_population: 40,
            death_window: 2000,
            min_death_window: 50,
            deadlock_limit: 80,
            hard_cull_factor: 1.3,
            zone_cycle: 1000,
            food_spawn_rate: 0.005,
            max_neighbors: 15,
            reproduction_threshold: 120.0,
            move_cost: 1.0,
            idle_factor: 0.6,
            max_population: 800,
            spawn_rate_range: TunableRange { min: 0.001, max: 0.03 },
            max_neighbors_range: TunableRange { min: 8.0, max: 30.0 },
            reproduction_threshold_range: TunableRange { min: 90.0, max: 160.0 },
            move_cost_range: TunableRange { min: 0.8, max: 2.5 },
            max_population_range: TunableRange { min: 200.0, max: 2000.0 },
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stats_interval: 100,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Width of one base sensory vector times the history window.
    pub fn controller_inputs(&self) -> usize {
        crate::senses::N_BASE_INPUTS * (1 + self.neural.history)
    }

    /// Validate configuration values. Any violation is fatal at startup.
    pub fn validate(&self) -> Result<(), SimError> {
        let fail = |msg: String| Err(SimError::Config(msg));

        if self.world.width < 2 || self.world.height < 2 {
            return fail("grid must be at least 2x2".into());
        }
        if self.world.width > 1024 || self.world.height > 1024 {
            return fail("grid dimensions must be at most 1024".into());
        }
        if self.world.initial_population == 0 {
            return fail("initial_population must be > 0".into());
        }
        let cells = self.world.width as usize * self.world.height as usize;
        if self.world.initial_population > cells {
            return fail("initial_population cannot exceed grid cell count".into());
        }
        if !(0.0..=1.0).contains(&self.world.initial_food_density) {
            return fail("initial_food_density must be within [0, 1]".into());
        }
        for zone in &self.world.food_zones {
            if !zone.is_valid() {
                return fail(format!("invalid food zone {zone:?}"));
            }
        }

        if self.agents.initial_energy <= 0.0 || self.agents.max_energy <= self.agents.initial_energy
        {
            return fail("agent energy bounds must satisfy 0 < initial < max".into());
        }
        if self.agents.birth_cost <= 0.0 {
            return fail("birth_cost must be > 0".into());
        }
        if self.agents.max_age == 0 || self.agents.trail_length == 0 {
            return fail("max_age and trail_length must be > 0".into());
        }

        if self.neural.hidden == 0 || self.neural.layers == 0 {
            return fail("controller must have at least one layer and one hidden unit".into());
        }
        if self.neural.history > 16 {
            return fail("input history window must be at most 16".into());
        }
        if self.neural.state_noise < 0.0 {
            return fail("state_noise must be >= 0".into());
        }

        if self.mutation.radius_min > self.mutation.radius_max || self.mutation.radius_max > 32 {
            return fail("perception radius range must satisfy min <= max <= 32".into());
        }
        if self.mutation.metabolism_min <= 0.0
            || self.mutation.metabolism_min >= self.mutation.metabolism_max
        {
            return fail("metabolism range must satisfy 0 < min < max".into());
        }
        if !(0.0..=1.0).contains(&self.mutation.weight_rate)
            || !(0.0..=1.0).contains(&self.mutation.personality_rate)
        {
            return fail("mutation rates must be within [0, 1]".into());
        }
        if self.mutation.weight_limit <= 0.0 {
            return fail("weight_limit must be > 0".into());
        }

        let b = &self.balancer;
        let ratios = b.target_crowd_ratio + b.target_energy_ratio + b.target_old_age_ratio;
        if !(0.0..=1.0).contains(&ratios) {
            return fail("death ratio targets must sum to at most 1".into());
        }
        if !(0.0..=1.0).contains(&b.ema_alpha) || b.ema_alpha == 0.0 {
            return fail("ema_alpha must be within (0, 1]".into());
        }
        if !(0.0..=1.0).contains(&b.idle_factor) || b.idle_factor == 0.0 {
            return fail("idle_factor must be within (0, 1]".into());
        }
        if b.hard_cull_factor < 1.0 {
            return fail("hard_cull_factor must be >= 1".into());
        }
        for (name, range) in [
            ("spawn_rate", b.spawn_rate_range),
            ("max_neighbors", b.max_neighbors_range),
            ("reproduction_threshold", b.reproduction_threshold_range),
            ("move_cost", b.move_cost_range),
            ("max_population", b.max_population_range),
        ] {
            if range.min > range.max {
                return fail(format!("{name} bounds must satisfy min <= max"));
            }
        }
        if b.spawn_rate_range.min < 0.0 || b.spawn_rate_range.max > 1.0 {
            return fail("spawn rate bounds must be within [0, 1]".into());
        }
        if !b.spawn_rate_range.contains(b.food_spawn_rate)
            || !b.max_neighbors_range.contains(b.max_neighbors as f32)
            || !b
                .reproduction_threshold_range
                .contains(b.reproduction_threshold)
            || !b.move_cost_range.contains(b.move_cost)
            || !b.max_population_range.contains(b.max_population as f32)
        {
            return fail("initial tunables must lie within their bounds".into());
        }
        // An agent reproducing at the lowest reachable threshold must still
        // have energy left to split with the child.
        if self.agents.birth_cost >= b.reproduction_threshold_range.min {
            return fail("birth_cost must be below the reproduction threshold lower bound".into());
        }
        if self.world.initial_population > b.max_population {
            return fail("initial_population cannot exceed max_population".into());
        }

        if self.logging.stats_interval == 0 {
            return fail("stats_interval must be > 0".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let loaded: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.world.width, loaded.world.width);
        assert_eq!(config.balancer.max_population, loaded.balancer.max_population);
    }

    #[test]
    fn test_rejects_threshold_below_birth_cost() {
        let mut config = Config::default();
        config.agents.birth_cost = 95.0;
        config.balancer.reproduction_threshold_range.min = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_bounds_tunable() {
        let mut config = Config::default();
        config.balancer.food_spawn_rate = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_controller_inputs_scale_with_history() {
        let mut config = Config::default();
        config.neural.history = 0;
        assert_eq!(config.controller_inputs(), crate::senses::N_BASE_INPUTS);
        config.neural.history = 3;
        assert_eq!(config.controller_inputs(), crate::senses::N_BASE_INPUTS * 4);
    }
}
