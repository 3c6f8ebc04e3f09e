//! # vivarium
//!
//! Evolutionary agent simulation on a bounded 2D grid.
//!
//! Each agent carries a heritable genome (trait values plus recurrent
//! controller weights), perceives its neighborhood through a fixed-length
//! sensory encoding, and decides an action through a batched LSTM step
//! covering the whole live population at once. Agents move, eat, die and
//! reproduce with mutation; an adaptive population balancer retunes world
//! parameters every tick to keep the population in a viable range across
//! thousands of ticks.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vivarium::{Config, Simulation, TickOutcome};
//!
//! let mut sim = Simulation::new(Config::default()).unwrap();
//! match sim.run(1000).unwrap() {
//!     TickOutcome::Extinct => println!("extinct at tick {}", sim.tick()),
//!     TickOutcome::Running => println!("population: {}", sim.population()),
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use vivarium::Config;
//!
//! let mut config = Config::default();
//! config.world.initial_population = 200;
//! config.mutation.weight_rate = 0.1;
//! ```

pub mod agent;
pub mod balancer;
pub mod config;
pub mod error;
pub mod genome;
pub mod grid;
pub mod neural;
pub mod senses;
pub mod sim;
pub mod snapshot;
pub mod stats;

// Re-export main types
pub use config::Config;
pub use error::SimError;
pub use sim::{Simulation, TickOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
