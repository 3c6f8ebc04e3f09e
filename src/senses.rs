//! Sensory encoding: a fixed-length numeric view of an agent's local
//! neighborhood.
//!
//! All distances are normalized by the perceiving agent's radius;
//! out-of-range entities yield the sentinel value 1.0 instead of an
//! unbounded distance, so vector length and scale are invariant regardless
//! of local density.

use crate::agent::Agent;
use crate::genome::Personality;
use crate::grid::{Bounds, FoodField, SpatialIndex};
use serde::Serialize;
use std::collections::HashMap;

/// Width of one base sensory vector.
pub const N_BASE_INPUTS: usize = 27;

/// Distance sentinel for entities outside the perception radius.
pub const OUT_OF_RANGE: f32 = 1.0;

/// World-pressure signals the balancer exposes to every agent's senses.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GlobalSignals {
    pub crowd: f32,
    pub energy: f32,
    pub old_age: f32,
}

/// One agent's sensory sample, kept on the agent for tooltip consumers.
#[derive(Debug, Clone, Serialize)]
pub struct Senses {
    pub food_count: u32,
    pub agent_count: u32,
    pub friend_count: u32,
    pub other_count: u32,
    /// Mean neighbor energy, normalized
    pub avg_energy: f32,
    /// Highest neighbor energy, normalized
    pub peak_energy: f32,
    /// Normalized Chebyshev distance to the nearest other agent
    pub nearest_agent: f32,
    /// Normalized offset toward the nearest other agent (zero when none)
    pub nearest_agent_dx: f32,
    pub nearest_agent_dy: f32,
    /// Normalized distance to the nearest same-color agent
    pub nearest_friend: f32,
    /// Normalized distance to the nearest map edge along each axis
    pub edge_x: f32,
    pub edge_y: f32,
    /// Food cell counts per direction
    pub food_up: u32,
    pub food_down: u32,
    pub food_left: u32,
    pub food_right: u32,
    /// Nearest straight-line food distance per direction
    pub food_up_dist: f32,
    pub food_down_dist: f32,
    pub food_left_dist: f32,
    pub food_right_dist: f32,
    /// Neighbors within the fixed crowding radius, excluding the agent
    pub crowd: u32,
}

impl Default for Senses {
    fn default() -> Self {
        Self {
            food_count: 0,
            agent_count: 0,
            friend_count: 0,
            other_count: 0,
            avg_energy: 0.0,
            peak_energy: 0.0,
            nearest_agent: OUT_OF_RANGE,
            nearest_agent_dx: 0.0,
            nearest_agent_dy: 0.0,
            nearest_friend: OUT_OF_RANGE,
            edge_x: 0.0,
            edge_y: 0.0,
            food_up: 0,
            food_down: 0,
            food_left: 0,
            food_right: 0,
            food_up_dist: OUT_OF_RANGE,
            food_down_dist: OUT_OF_RANGE,
            food_left_dist: OUT_OF_RANGE,
            food_right_dist: OUT_OF_RANGE,
            crowd: 0,
        }
    }
}

impl Senses {
    /// Sample the neighborhood of one agent. Pure read of the grid state as
    /// of the end of the previous tick.
    #[allow(clippy::too_many_arguments)]
    pub fn perceive(
        agent: &Agent,
        food: &FoodField,
        index: &SpatialIndex,
        agents: &[Agent],
        by_id: &HashMap<u64, usize>,
        bounds: &Bounds,
        crowd_radius: u8,
        max_energy: f32,
    ) -> Senses {
        let mut senses = Senses::default();
        let x = agent.x as i32;
        let y = agent.y as i32;

        // Food scan within the food perception radius.
        let fr = agent.genome.food_radius as i32;
        let mut up_dist: Option<i32> = None;
        let mut down_dist: Option<i32> = None;
        let mut left_dist: Option<i32> = None;
        let mut right_dist: Option<i32> = None;
        for dy in -fr..=fr {
            for dx in -fr..=fr {
                let (nx, ny) = (x + dx, y + dy);
                if !bounds.contains(nx, ny) || !food.has_food(nx as u16, ny as u16) {
                    continue;
                }
                senses.food_count += 1;
                if dx == 0 && dy == 0 {
                    continue;
                }
                if dx.abs() >= dy.abs() {
                    if dx > 0 {
                        senses.food_right += 1;
                    } else if dx < 0 {
                        senses.food_left += 1;
                    }
                }
                if dy.abs() >= dx.abs() {
                    if dy > 0 {
                        senses.food_down += 1;
                    } else if dy < 0 {
                        senses.food_up += 1;
                    }
                }
                // Straight-line distances along each cardinal axis.
                if dx == 0 && dy < 0 {
                    up_dist = Some(up_dist.map_or(-dy, |d| d.min(-dy)));
                } else if dx == 0 && dy > 0 {
                    down_dist = Some(down_dist.map_or(dy, |d| d.min(dy)));
                } else if dy == 0 && dx < 0 {
                    left_dist = Some(left_dist.map_or(-dx, |d| d.min(-dx)));
                } else if dy == 0 && dx > 0 {
                    right_dist = Some(right_dist.map_or(dx, |d| d.min(dx)));
                }
            }
        }
        let food_norm = (fr + 1) as f32;
        senses.food_up_dist = up_dist.map_or(OUT_OF_RANGE, |d| d as f32 / food_norm);
        senses.food_down_dist = down_dist.map_or(OUT_OF_RANGE, |d| d as f32 / food_norm);
        senses.food_left_dist = left_dist.map_or(OUT_OF_RANGE, |d| d as f32 / food_norm);
        senses.food_right_dist = right_dist.map_or(OUT_OF_RANGE, |d| d as f32 / food_norm);

        // Agent scan within the agent perception radius.
        let ar = agent.genome.agent_radius as i32;
        let agent_norm = (ar + 1) as f32;
        let mut energy_sum = 0.0;
        let mut nearest_agent: Option<(i32, i32, i32)> = None;
        let mut nearest_friend: Option<i32> = None;
        for dy in -ar..=ar {
            for dx in -ar..=ar {
                let (nx, ny) = (x + dx, y + dy);
                if !bounds.contains(nx, ny) {
                    continue;
                }
                for &id in index.ids_at(nx as u16, ny as u16) {
                    if id == agent.id {
                        continue;
                    }
                    let Some(&other_idx) = by_id.get(&id) else {
                        continue;
                    };
                    let other = &agents[other_idx];
                    let dist = dx.abs().max(dy.abs());
                    senses.agent_count += 1;
                    energy_sum += other.energy;
                    senses.peak_energy = senses.peak_energy.max(other.energy / max_energy);
                    if nearest_agent.map_or(true, |(d, _, _)| dist < d) {
                        nearest_agent = Some((dist, dx, dy));
                    }
                    if other.genome.color == agent.genome.color {
                        senses.friend_count += 1;
                        nearest_friend = Some(nearest_friend.map_or(dist, |d| d.min(dist)));
                    } else {
                        senses.other_count += 1;
                    }
                }
            }
        }
        if senses.agent_count > 0 {
            senses.avg_energy = energy_sum / senses.agent_count as f32 / max_energy;
        }
        if let Some((dist, dx, dy)) = nearest_agent {
            senses.nearest_agent = dist as f32 / agent_norm;
            senses.nearest_agent_dx = dx as f32 / agent_norm;
            senses.nearest_agent_dy = dy as f32 / agent_norm;
        }
        senses.nearest_friend = nearest_friend.map_or(OUT_OF_RANGE, |d| d as f32 / agent_norm);

        // Crowding uses a fixed radius so the death rule measures density,
        // not perception.
        senses.crowd = index
            .count_radius(agent.x, agent.y, crowd_radius)
            .saturating_sub(1) as u32;

        senses.edge_x = (agent.x.min(bounds.width - 1 - agent.x)) as f32 / (bounds.width - 1) as f32;
        senses.edge_y =
            (agent.y.min(bounds.height - 1 - agent.y)) as f32 / (bounds.height - 1) as f32;

        senses
    }

    /// Assemble the normalized base input vector, applying the
    /// personality bias.
    pub fn to_inputs(
        &self,
        personality: Personality,
        energy_norm: f32,
        visited_here: bool,
        last_move: (i8, i8),
        signals: &GlobalSignals,
    ) -> Vec<f32> {
        let mut v = vec![
            self.food_count as f32 / 10.0,
            self.agent_count as f32 / 10.0,
            self.friend_count as f32 / 10.0,
            self.other_count as f32 / 10.0,
            self.avg_energy,
            self.peak_energy,
            self.nearest_agent,
            self.nearest_agent_dx,
            self.nearest_agent_dy,
            self.nearest_friend,
            self.edge_x,
            self.edge_y,
            self.food_up as f32 / 5.0,
            self.food_down as f32 / 5.0,
            self.food_left as f32 / 5.0,
            self.food_right as f32 / 5.0,
            self.food_up_dist,
            self.food_down_dist,
            self.food_left_dist,
            self.food_right_dist,
            if visited_here { 1.0 } else { 0.0 },
            last_move.0 as f32,
            last_move.1 as f32,
            energy_norm,
            signals.crowd,
            signals.energy,
            signals.old_age,
        ];
        debug_assert_eq!(v.len(), N_BASE_INPUTS);

        const BOOST: f32 = 1.2;
        match personality {
            // Explorer leans on the forward food distance; the social
            // personalities weight the neighbor count.
            Personality::Explorer => v[16] *= BOOST,
            Personality::Survivor => v[4] *= BOOST,
            Personality::Feeder => v[0] *= BOOST,
            Personality::Loner => v[1] *= BOOST,
            Personality::Social => v[1] *= -BOOST,
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::config::Config;
    use crate::genome::Genome;
    use crate::grid::{Bounds, FoodField, SpatialIndex};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.neural.hidden = 4;
        config.neural.layers = 1;
        config.neural.history = 0;
        config
    }

    fn setup(positions: &[(u16, u16)]) -> (Vec<Agent>, HashMap<u64, usize>, SpatialIndex, Bounds) {
        let config = small_config();
        let bounds = Bounds::new(30, 30);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut agents = Vec::new();
        let mut index = SpatialIndex::new(bounds);
        let mut by_id = HashMap::new();
        for (i, &(x, y)) in positions.iter().enumerate() {
            let mut genome = Genome::random(&mut rng, &config);
            genome.food_radius = 3;
            genome.agent_radius = 3;
            let agent = Agent::new(i as u64, x, y, genome, 50.0);
            index.place(agent.id, x as i32, y as i32).unwrap();
            by_id.insert(agent.id, i);
            agents.push(agent);
        }
        (agents, by_id, index, bounds)
    }

    #[test]
    fn test_no_food_yields_sentinel() {
        let (agents, by_id, index, bounds) = setup(&[(15, 15)]);
        let food = FoodField::new(bounds, 0);
        let s = Senses::perceive(&agents[0], &food, &index, &agents, &by_id, &bounds, 2, 200.0);
        assert_eq!(s.food_count, 0);
        assert_eq!(s.food_up_dist, OUT_OF_RANGE);
        assert_eq!(s.food_left_dist, OUT_OF_RANGE);
        assert_eq!(s.nearest_agent, OUT_OF_RANGE);
    }

    #[test]
    fn test_directional_food() {
        let (agents, by_id, index, bounds) = setup(&[(15, 15)]);
        let mut food = FoodField::new(bounds, 0);
        food.set(15, 13, true); // two cells up
        food.set(17, 15, true); // two cells right
        let s = Senses::perceive(&agents[0], &food, &index, &agents, &by_id, &bounds, 2, 200.0);
        assert_eq!(s.food_count, 2);
        assert_eq!(s.food_up, 1);
        assert_eq!(s.food_right, 1);
        assert_eq!(s.food_down, 0);
        // Distance normalized by radius + 1.
        assert!((s.food_up_dist - 2.0 / 4.0).abs() < 1e-6);
        assert!((s.food_right_dist - 2.0 / 4.0).abs() < 1e-6);
        assert_eq!(s.food_down_dist, OUT_OF_RANGE);
    }

    #[test]
    fn test_friend_and_other_detection() {
        let (mut agents, by_id, index, bounds) = setup(&[(15, 15), (16, 15), (14, 14)]);
        agents[1].genome.color = agents[0].genome.color;
        agents[2].genome.color = [
            agents[0].genome.color[0].wrapping_add(40),
            agents[0].genome.color[1],
            agents[0].genome.color[2],
        ];
        let food = FoodField::new(bounds, 0);
        let s = Senses::perceive(&agents[0], &food, &index, &agents, &by_id, &bounds, 2, 200.0);
        assert_eq!(s.agent_count, 2);
        assert_eq!(s.friend_count, 1);
        assert_eq!(s.other_count, 1);
        assert!((s.nearest_friend - 1.0 / 4.0).abs() < 1e-6);
        assert_eq!(s.crowd, 2);
    }

    #[test]
    fn test_edge_distances() {
        let (agents, by_id, index, bounds) = setup(&[(0, 15)]);
        let food = FoodField::new(bounds, 0);
        let s = Senses::perceive(&agents[0], &food, &index, &agents, &by_id, &bounds, 2, 200.0);
        assert_eq!(s.edge_x, 0.0);
        assert!(s.edge_y > 0.0);
    }

    #[test]
    fn test_input_vector_length_is_invariant() {
        let (agents, by_id, index, bounds) = setup(&[(15, 15), (16, 15), (16, 16), (14, 15)]);
        let mut food = FoodField::new(bounds, 0);
        for x in 10..20 {
            food.set(x, 14, true);
        }
        let signals = GlobalSignals::default();
        for agent in &agents {
            let s = Senses::perceive(agent, &food, &index, &agents, &by_id, &bounds, 2, 200.0);
            let v = s.to_inputs(agent.genome.personality, 0.5, false, (0, 0), &signals);
            assert_eq!(v.len(), N_BASE_INPUTS);
            assert!(v.iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn test_personality_bias() {
        let (mut agents, by_id, index, bounds) = setup(&[(15, 15)]);
        agents[0].genome.personality = Personality::Feeder;
        let mut food = FoodField::new(bounds, 0);
        food.set(15, 15, true);
        let signals = GlobalSignals::default();
        let s = Senses::perceive(&agents[0], &food, &index, &agents, &by_id, &bounds, 2, 200.0);
        let biased = s.to_inputs(Personality::Feeder, 0.5, false, (0, 0), &signals);
        let plain = s.to_inputs(Personality::Survivor, 0.5, false, (0, 0), &signals);
        assert!((biased[0] - plain[0] * 1.2).abs() < 1e-6);
    }
}
