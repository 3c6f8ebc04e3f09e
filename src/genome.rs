//! Heritable agent traits and the mutation rule.
//!
//! A genome is immutable once created: reproduction derives a new genome
//! from the parent's through [`Genome::mutated`], which is a pure function
//! of the parent and the random source.

use crate::agent::N_ACTIONS;
use crate::config::Config;
use crate::neural::{Architecture, ControllerWeights};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Behavioral archetype biasing the sensory vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Personality {
    Explorer,
    Survivor,
    Feeder,
    Loner,
    Social,
}

impl Personality {
    pub const ALL: [Personality; 5] = [
        Personality::Explorer,
        Personality::Survivor,
        Personality::Feeder,
        Personality::Loner,
        Personality::Social,
    ];

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Personality::Explorer => 0,
            Personality::Survivor => 1,
            Personality::Feeder => 2,
            Personality::Loner => 3,
            Personality::Social => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Personality::Explorer => "explorer",
            Personality::Survivor => "survivor",
            Personality::Feeder => "feeder",
            Personality::Loner => "loner",
            Personality::Social => "social",
        }
    }
}

/// Heritable description of one agent: trait values plus controller
/// weights.
#[derive(Debug, Clone)]
pub struct Genome {
    /// Display color; also the friend-group key (same color == friend).
    pub color: [u8; 3],
    /// Perception radius for food sensing
    pub food_radius: u8,
    /// Perception radius for agent sensing
    pub agent_radius: u8,
    pub personality: Personality,
    /// Per-tick energy cost scale
    pub metabolism: f32,
    pub weights: ControllerWeights,
}

/// Controller architecture implied by the configuration.
pub fn architecture(config: &Config) -> Architecture {
    Architecture {
        n_inputs: config.controller_inputs(),
        hidden: config.neural.hidden,
        layers: config.neural.layers,
        n_actions: N_ACTIONS,
    }
}

impl Genome {
    /// Fresh random genome for a seeded agent.
    pub fn random<R: Rng>(rng: &mut R, config: &Config) -> Self {
        let m = &config.mutation;
        Self {
            color: rng.gen(),
            food_radius: rng.gen_range(m.radius_min..=m.radius_max),
            agent_radius: rng.gen_range(m.radius_min..=m.radius_max),
            personality: Personality::random(rng),
            metabolism: rng.gen_range(m.metabolism_min..m.metabolism_max),
            weights: ControllerWeights::random(rng, architecture(config)),
        }
    }

    /// Derive a child genome: every trait and every controller weight
    /// mutates independently, clamped to its configured range. The parent
    /// is never modified.
    pub fn mutated<R: Rng>(&self, rng: &mut R, config: &Config) -> Self {
        let m = &config.mutation;
        let step = m.color_step as i16;
        let mut color = self.color;
        for channel in &mut color {
            let shifted = *channel as i16 + rng.gen_range(-step..=step);
            *channel = shifted.clamp(0, 255) as u8;
        }

        let mutate_radius = |value: u8, rng: &mut R| {
            let shifted = value as i16 + rng.gen_range(-1..=1);
            shifted.clamp(m.radius_min as i16, m.radius_max as i16) as u8
        };
        let food_radius = mutate_radius(self.food_radius, rng);
        let agent_radius = mutate_radius(self.agent_radius, rng);

        let personality = if rng.gen::<f32>() < m.personality_rate {
            Personality::random(rng)
        } else {
            self.personality
        };

        let metabolism = (self.metabolism
            + rng.gen_range(-m.metabolism_jitter..=m.metabolism_jitter))
        .clamp(m.metabolism_min, m.metabolism_max);

        Self {
            color,
            food_radius,
            agent_radius,
            personality,
            metabolism,
            weights: self
                .weights
                .mutated(rng, m.weight_rate, m.weight_strength, m.weight_limit),
        }
    }

    /// Euclidean distance between two genome colors, for diversity stats.
    pub fn color_distance(&self, other: &Genome) -> f32 {
        self.color
            .iter()
            .zip(other.color.iter())
            .map(|(&a, &b)| {
                let d = a as f32 - b as f32;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.neural.hidden = 4;
        config.neural.layers = 1;
        config.neural.history = 0;
        config
    }

    #[test]
    fn test_random_genome_in_range() {
        let config = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..50 {
            let g = Genome::random(&mut rng, &config);
            assert!(g.food_radius >= config.mutation.radius_min);
            assert!(g.food_radius <= config.mutation.radius_max);
            assert!(g.metabolism >= config.mutation.metabolism_min);
            assert!(g.metabolism <= config.mutation.metabolism_max);
            assert!(g.weights.is_valid());
        }
    }

    #[test]
    fn test_mutation_never_leaves_trait_ranges() {
        let config = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut genome = Genome::random(&mut rng, &config);

        // A long descent chain stays in range at every generation.
        for _ in 0..500 {
            genome = genome.mutated(&mut rng, &config);
            assert!(genome.food_radius >= config.mutation.radius_min);
            assert!(genome.food_radius <= config.mutation.radius_max);
            assert!(genome.agent_radius >= config.mutation.radius_min);
            assert!(genome.agent_radius <= config.mutation.radius_max);
            assert!(genome.metabolism >= config.mutation.metabolism_min);
            assert!(genome.metabolism <= config.mutation.metabolism_max);
            assert!(genome
                .weights
                .layers
                .iter()
                .all(|l| l.w_ih.iter().all(|w| w.abs() <= config.mutation.weight_limit)));
        }
    }

    #[test]
    fn test_mutation_leaves_parent_untouched() {
        let config = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let parent = Genome::random(&mut rng, &config);
        let color = parent.color;
        let fingerprint = parent.weights.fingerprint();

        let _child = parent.mutated(&mut rng, &config);

        assert_eq!(parent.color, color);
        assert_eq!(parent.weights.fingerprint(), fingerprint);
    }

    #[test]
    fn test_personality_reroll_rate_zero_is_stable() {
        let mut config = small_config();
        config.mutation.personality_rate = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let parent = Genome::random(&mut rng, &config);
        for _ in 0..20 {
            let child = parent.mutated(&mut rng, &config);
            assert_eq!(child.personality, parent.personality);
        }
    }
}
