// src/config/scenario.rs

use serde::Deserialize;

use crate::config::parameters::{PerturbationSettings, PhysicalParameters, SimulationSettings};

/// 実行シナリオ (config/parameters.yaml の内容)
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Scenario {
    pub physical: PhysicalParameters,
    pub simulation: SimulationSettings,
    pub perturbation: PerturbationSettings,
    pub observation_file: String, // 観測データ (空白区切り)
    pub output_file: String,      // 計算結果のCSV
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            physical: PhysicalParameters::default(),
            simulation: SimulationSettings::default(),
            perturbation: PerturbationSettings::default(),
            observation_file: String::from("data/observations.txt"),
            output_file: String::from("output/trajectory.csv"),
        }
    }
}
