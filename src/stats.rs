//! Statistics tracking for the simulation.

use crate::agent::{Agent, DeathCause};
use crate::genome::Personality;
use serde::{Deserialize, Serialize};

/// Statistics snapshot for one tick
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Stats {
    pub tick: u64,
    pub population: usize,
    /// Births this tick
    pub births: usize,
    /// Deaths this tick
    pub deaths: usize,
    pub deaths_starvation: usize,
    pub deaths_old_age: usize,
    pub deaths_crowding: usize,
    pub deaths_culled: usize,
    pub energy_mean: f32,
    pub age_mean: f32,
    pub age_max: u32,
    /// Mean local agent density over the live population
    pub crowding_index: f32,
    /// Food cells currently present
    pub food_cells: usize,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from the current live roster.
    pub fn update(
        &mut self,
        tick: u64,
        agents: &[Agent],
        food_cells: usize,
        births: usize,
        deaths: &[usize; 4],
    ) {
        self.tick = tick;
        self.population = agents.len();
        self.births = births;
        self.deaths = deaths.iter().sum();
        self.deaths_starvation = deaths[DeathCause::Starvation.index()];
        self.deaths_old_age = deaths[DeathCause::OldAge.index()];
        self.deaths_crowding = deaths[DeathCause::Crowding.index()];
        self.deaths_culled = deaths[DeathCause::Culled.index()];
        self.food_cells = food_cells;

        if agents.is_empty() {
            self.energy_mean = 0.0;
            self.age_mean = 0.0;
            self.age_max = 0;
            self.crowding_index = 0.0;
            return;
        }
        let n = agents.len() as f32;
        self.energy_mean = agents.iter().map(|a| a.energy).sum::<f32>() / n;
        self.age_mean = agents.iter().map(|a| a.age as f32).sum::<f32>() / n;
        self.age_max = agents.iter().map(|a| a.age).max().unwrap_or(0);
        self.crowding_index = agents.iter().map(|a| a.senses.crowd as f32).sum::<f32>() / n;
    }

    /// Format stats as a one-line summary
    pub fn summary(&self) -> String {
        format!(
            "T:{:6} | Pop:{:5} | B:{:3} D:{:3} | Energy:{:6.1} | Age:{:6.1} | Food:{:5} | Crowd:{:.2}",
            self.tick,
            self.population,
            self.births,
            self.deaths,
            self.energy_mean,
            self.age_mean,
            self.food_cells,
            self.crowding_index,
        )
    }
}

/// Historical statistics tracker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsHistory {
    pub snapshots: Vec<Stats>,
    pub interval: u64,
}

impl StatsHistory {
    pub fn new(interval: u64) -> Self {
        Self {
            snapshots: Vec::new(),
            interval,
        }
    }

    pub fn record(&mut self, stats: Stats) {
        self.snapshots.push(stats);
    }

    /// Population over time
    pub fn population_series(&self) -> Vec<(u64, usize)> {
        self.snapshots.iter().map(|s| (s.tick, s.population)).collect()
    }

    /// Save history as JSON
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
    }
}

/// Running totals over the whole run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub births: u64,
    pub deaths: u64,
    pub deaths_by_cause: [u64; 4],
    pub peak_population: usize,
}

impl RunTotals {
    pub fn record_death(&mut self, cause: DeathCause) {
        self.deaths += 1;
        self.deaths_by_cause[cause.index()] += 1;
    }

    pub fn record_births(&mut self, count: usize) {
        self.births += count as u64;
    }

    pub fn observe_population(&mut self, population: usize) {
        self.peak_population = self.peak_population.max(population);
    }
}

/// Genome diversity summary for the final report
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiversitySummary {
    pub population: usize,
    /// Live agents per personality, in [`Personality::ALL`] order
    pub personalities: [usize; 5],
    /// Mean color distance to the population's mean color
    pub color_spread: f32,
    pub radius_min: u8,
    pub radius_max: u8,
    /// Distinct controller weight fingerprints
    pub distinct_genomes: usize,
}

impl DiversitySummary {
    pub fn compute(agents: &[Agent]) -> Self {
        let mut summary = Self {
            population: agents.len(),
            ..Self::default()
        };
        if agents.is_empty() {
            return summary;
        }

        for agent in agents {
            summary.personalities[agent.genome.personality.index()] += 1;
        }

        let n = agents.len() as f32;
        let mut mean_color = [0.0f32; 3];
        for agent in agents {
            for (m, &c) in mean_color.iter_mut().zip(agent.genome.color.iter()) {
                *m += c as f32 / n;
            }
        }
        summary.color_spread = agents
            .iter()
            .map(|a| {
                a.genome
                    .color
                    .iter()
                    .zip(mean_color.iter())
                    .map(|(&c, &m)| (c as f32 - m).powi(2))
                    .sum::<f32>()
                    .sqrt()
            })
            .sum::<f32>()
            / n;

        summary.radius_min = agents.iter().map(|a| a.genome.food_radius).min().unwrap_or(0);
        summary.radius_max = agents.iter().map(|a| a.genome.food_radius).max().unwrap_or(0);

        let fingerprints: std::collections::HashSet<u64> = agents
            .iter()
            .map(|a| a.genome.weights.fingerprint())
            .collect();
        summary.distinct_genomes = fingerprints.len();

        summary
    }
}

impl std::fmt::Display for DiversitySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} alive, {} distinct genomes, color spread {:.1}, radii {}-{}, personalities [",
            self.population, self.distinct_genomes, self.color_spread, self.radius_min, self.radius_max)?;
        for (i, p) in Personality::ALL.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", p.label(), self.personalities[i])?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::genome::Genome;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.neural.hidden = 4;
        config.neural.layers = 1;
        config.neural.history = 0;
        config
    }

    fn roster(count: usize) -> Vec<Agent> {
        let config = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        (0..count)
            .map(|i| {
                let genome = Genome::random(&mut rng, &config);
                let mut agent = Agent::new(i as u64, i as u16, 0, genome, 40.0 + i as f32);
                agent.age = i as u32 * 10;
                agent
            })
            .collect()
    }

    #[test]
    fn test_stats_update() {
        let agents = roster(4);
        let mut stats = Stats::new();
        stats.update(7, &agents, 25, 2, &[1, 0, 3, 0]);

        assert_eq!(stats.tick, 7);
        assert_eq!(stats.population, 4);
        assert_eq!(stats.births, 2);
        assert_eq!(stats.deaths, 4);
        assert_eq!(stats.deaths_crowding, 3);
        assert_eq!(stats.age_max, 30);
        assert!((stats.energy_mean - 41.5).abs() < 1e-4);
    }

    #[test]
    fn test_stats_empty_roster() {
        let mut stats = Stats::new();
        stats.update(1, &[], 0, 0, &[0; 4]);
        assert_eq!(stats.population, 0);
        assert_eq!(stats.energy_mean, 0.0);
    }

    #[test]
    fn test_history_series() {
        let mut history = StatsHistory::new(10);
        for i in 0..5u64 {
            let mut stats = Stats::new();
            stats.tick = i * 10;
            stats.population = (i as usize + 1) * 100;
            history.record(stats);
        }
        let series = history.population_series();
        assert_eq!(series.len(), 5);
        assert_eq!(series[4], (40, 500));
    }

    #[test]
    fn test_run_totals() {
        let mut totals = RunTotals::default();
        totals.record_death(DeathCause::Starvation);
        totals.record_death(DeathCause::Starvation);
        totals.record_death(DeathCause::Culled);
        totals.record_births(3);
        totals.observe_population(120);
        totals.observe_population(80);

        assert_eq!(totals.deaths, 3);
        assert_eq!(totals.deaths_by_cause[DeathCause::Starvation.index()], 2);
        assert_eq!(totals.births, 3);
        assert_eq!(totals.peak_population, 120);
    }

    #[test]
    fn test_diversity_summary() {
        let agents = roster(10);
        let summary = DiversitySummary::compute(&agents);

        assert_eq!(summary.population, 10);
        assert_eq!(summary.personalities.iter().sum::<usize>(), 10);
        // Independent random genomes are all distinct.
        assert_eq!(summary.distinct_genomes, 10);
        assert!(summary.radius_min <= summary.radius_max);
    }
}
