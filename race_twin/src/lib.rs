//! Race strategy core: per-driver behavioural twins, Monte Carlo race
//! simulation and a weighted pit-stop decision engine.

pub mod config;
pub mod degradation;
pub mod driver_twin;
pub mod error;
pub mod fit;
pub mod lap_window;
pub mod monte_carlo;
pub mod overtake;
pub mod pit_decision;
pub mod pit_rejoin;
pub mod registry;
pub mod simulator;
pub mod stats;
pub mod strategy;
pub mod traffic;
pub mod types;
pub mod validate;
pub mod weather;

pub use config::EngineConfig;
pub use driver_twin::{DriverTwin, DriverTwinGenerator};
pub use error::{ConfigError, FitError, SimulationError, ValidationError};
pub use pit_decision::{AdvancedPitDecisionEngine, PitDecision, PitDecisionInput};
pub use registry::DriverTwinRegistry;
pub use simulator::{RaceSimulationRequest, RaceTwin, RaceTwinSimulator, SimulationControl};
pub use types::{DriverRecord, Sector, TireCompound, WeatherRecord};
