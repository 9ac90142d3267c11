// src/simulation/load_parameters.rs

use std::fs::File;
use std::path::Path;

use serde_yaml::from_reader;

use crate::config::Scenario;
use crate::simulation::error::SimulationError;

/// シナリオの読み込み
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<Scenario, SimulationError> {
    let file = File::open(path)?;
    let scenario: Scenario = from_reader(file)?;
    Ok(scenario)
}
