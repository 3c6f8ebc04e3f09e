//! Integration tests for vivarium

use vivarium::config::Config;
use vivarium::genome::Genome;
use vivarium::grid::{Bounds, FoodField};
use vivarium::neural::{BrainBatch, RosterEntry};
use vivarium::sim::{Simulation, TickOutcome};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Shrink the controller so debug-mode runs stay fast. Energy and balancer
/// dynamics keep their defaults.
fn lean_brain(config: &mut Config) {
    config.neural.hidden = 8;
    config.neural.layers = 1;
    config.neural.history = 0;
    config.mutation.radius_max = 4;
}

#[test]
fn test_starvation_reaches_extinction() {
    let mut config = Config::default();
    lean_brain(&mut config);
    config.world.width = 50;
    config.world.height = 50;
    config.world.initial_population = 50;
    config.world.food_zones = Vec::new();
    config.world.initial_food_density = 0.0;

    let mut sim = Simulation::new_with_seed(config, 1234).unwrap();

    // With zero food zones and positive energy decay the population must
    // starve out within a bounded number of ticks.
    let outcome = sim.run(2000).unwrap();
    assert_eq!(outcome, TickOutcome::Extinct);
    assert!(sim.is_extinct());
    assert!(sim.tick() < 2000, "extinction took too long: {}", sim.tick());
}

#[test]
fn test_population_stays_in_balancer_band() {
    let mut config = Config::default();
    lean_brain(&mut config);
    config.world.width = 50;
    config.world.height = 50;
    config.world.initial_population = 200;

    let min_population = config.balancer.min_population;
    let max_population = config.balancer.max_population;

    let mut sim = Simulation::new_with_seed(config, 2024).unwrap();
    let outcome = sim.run(1000).unwrap();

    assert_eq!(outcome, TickOutcome::Running, "population went extinct");
    let population = sim.population();
    assert!(
        population >= min_population && population <= max_population,
        "population {population} outside band [{min_population}, {max_population}]"
    );
}

#[test]
fn test_tunables_within_bounds_after_long_run() {
    let mut config = Config::default();
    lean_brain(&mut config);
    config.world.width = 50;
    config.world.height = 50;
    config.world.initial_population = 150;
    let b = config.balancer.clone();

    let mut sim = Simulation::new_with_seed(config, 7).unwrap();
    sim.run(500).unwrap();

    let t = sim.tunables();
    assert!(b.spawn_rate_range.contains(t.food_spawn_rate));
    assert!(b.max_neighbors_range.contains(t.max_neighbors as f32));
    assert!(b
        .reproduction_threshold_range
        .contains(t.reproduction_threshold));
    assert!(b.move_cost_range.contains(t.move_cost));
    assert!(b.max_population_range.contains(t.max_population as f32));
}

#[test]
fn test_contested_cell_goes_to_lowest_id() {
    let mut food = FoodField::new(Bounds::new(20, 20), 4);

    // No food at the cell: nobody wins.
    assert_eq!(food.resolve_eat(5, 5, &[2, 1]), None);

    // Two claimants: the lower id eats, the cell is cleared, and the
    // loser's attempt has no side effects to retry with.
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let zone = vivarium::grid::FoodZone::new(0.0, 1.0, 0.0, 1.0);
    food.seed(&zone, 1.0, &Default::default(), &mut rng);
    assert_eq!(food.resolve_eat(5, 5, &[8, 3]), Some(3));
    assert_eq!(food.resolve_eat(5, 5, &[8]), None);
}

#[test]
fn test_zero_agent_batch_is_empty() {
    let mut config = Config::default();
    lean_brain(&mut config);
    let mut batch = BrainBatch::new(vivarium::genome::architecture(&config));

    let inputs = ndarray::Array2::zeros((0, config.controller_inputs()));
    let out = batch.step(&inputs, &[]).unwrap();
    assert_eq!(out.nrows(), 0);
}

#[test]
fn test_batch_survives_roster_churn() {
    let mut config = Config::default();
    lean_brain(&mut config);
    let arch = vivarium::genome::architecture(&config);
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let genome = Genome::random(&mut rng, &config);

    let mut batch = BrainBatch::new(arch);
    let mut roster: Vec<RosterEntry> = (0..10)
        .map(|id| RosterEntry { id, parent: None })
        .collect();
    batch.sync(&roster, false, 0.0, &mut rng);

    // Churn the roster for a while: drop the lowest id, add a newborn.
    let mut next_id = 10;
    for _ in 0..50 {
        let inputs = ndarray::Array2::from_elem((roster.len(), arch.n_inputs), 0.1);
        let weights: Vec<_> = roster.iter().map(|_| &genome.weights).collect();
        let out = batch.step(&inputs, &weights).unwrap();
        assert_eq!(out.nrows(), roster.len());

        let parent = roster.last().unwrap().id;
        roster.remove(0);
        roster.push(RosterEntry {
            id: next_id,
            parent: Some(parent),
        });
        next_id += 1;
        batch.sync(&roster, true, 0.01, &mut rng);
        assert_eq!(batch.len(), roster.len());
    }
}

#[test]
fn test_descendant_traits_stay_in_range() {
    let mut config = Config::default();
    lean_brain(&mut config);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mut genome = Genome::random(&mut rng, &config);
    for _ in 0..200 {
        genome = genome.mutated(&mut rng, &config);
        assert!(genome.food_radius >= config.mutation.radius_min);
        assert!(genome.food_radius <= config.mutation.radius_max);
        assert!(genome.agent_radius >= config.mutation.radius_min);
        assert!(genome.agent_radius <= config.mutation.radius_max);
        assert!(genome.metabolism >= config.mutation.metabolism_min);
        assert!(genome.metabolism <= config.mutation.metabolism_max);
    }
}

#[test]
fn test_long_run_keeps_energy_in_bounds() {
    let mut config = Config::default();
    lean_brain(&mut config);
    config.world.width = 40;
    config.world.height = 40;
    config.world.initial_population = 80;
    let max_energy = config.agents.max_energy;

    let mut sim = Simulation::new_with_seed(config, 55).unwrap();
    for _ in 0..200 {
        if sim.step().unwrap() == TickOutcome::Extinct {
            break;
        }
        for snapshot in sim.agents_snapshot() {
            assert!(
                snapshot.energy > 0.0 && snapshot.energy <= max_energy,
                "agent {} energy {} out of bounds",
                snapshot.id,
                snapshot.energy
            );
        }
    }
}
