// src/simulation/mod.rs

pub mod load_parameters;
pub mod observations;
pub mod trajectory;
pub mod cost;
pub mod csv;
pub mod framework;
pub mod sensitivity;
pub mod error;

pub use error::SimulationError;
pub use framework::{run_simulation, SimulationOutcome};
pub use observations::{load_observations, ObservationSeries};
pub use sensitivity::{run_sensitivity_passes, Perturbation, SensitivityPasses, SensitivityReport};
