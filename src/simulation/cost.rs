// src/simulation/cost.rs

use crate::simulation::error::SimulationError;

/// 観測位置との二乗残差の累積
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostAccumulator {
    sum: f64,
    count: usize,
}

impl CostAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// (observed - simulated)² を加える
    pub fn add_residual(&mut self, observed: f64, simulated: f64) {
        self.sum += (observed - simulated).powi(2);
        self.count += 1;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// ステップ数で正規化したコスト sum / N
    pub fn normalized(&self) -> Result<f64, SimulationError> {
        if self.count == 0 {
            return Err(SimulationError::EmptyCost);
        }
        Ok(self.sum / self.count as f64)
    }
}
