// src/config/mod.rs

pub mod parameters;
pub mod scenario;

pub use parameters::{Parameter, PerturbationSettings, PhysicalParameters, SimulationSettings};
pub use scenario::Scenario;
