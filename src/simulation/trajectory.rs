// src/simulation/trajectory.rs

use crate::math::MotionState;
use crate::simulation::error::SimulationError;

/// 各ステップの時刻・位置・速度を記録するバッファ
///
/// 長さは時間グリッドから事前に決まり、各インデックスは先頭から順に一度だけ書き込める。
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    times: Vec<f64>,
    positions: Vec<f64>,
    velocities: Vec<f64>,
    written: usize,
}

impl Trajectory {
    pub fn with_len(len: usize) -> Self {
        Trajectory {
            times: vec![0.0; len],
            positions: vec![0.0; len],
            velocities: vec![0.0; len],
            written: 0,
        }
    }

    /// ステップ `index` の結果を記録する
    ///
    /// # 引数
    /// - `index`: ステップ番号 (0 始まり)
    /// - `time`: 時刻
    /// - `state`: 更新後の状態
    pub fn record(
        &mut self,
        index: usize,
        time: f64,
        state: MotionState,
    ) -> Result<(), SimulationError> {
        let len = self.len();
        if index >= len {
            return Err(SimulationError::TrajectoryOverflow { index, len });
        }
        if index != self.written {
            return Err(SimulationError::TrajectoryOutOfOrder { index, expected: self.written });
        }
        self.times[index] = time;
        self.positions[index] = state.position;
        self.velocities[index] = state.velocity;
        self.written += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.velocities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocities.is_empty()
    }

    /// すべてのインデックスが書き込まれたか
    pub fn is_complete(&self) -> bool {
        self.written == self.len()
    }

    pub fn times(&self) -> &[f64] {
        &self.times[..self.written]
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions[..self.written]
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities[..self.written]
    }

    /// 最後に書き込まれたステップ (時刻, 状態)
    pub fn last(&self) -> Option<(f64, MotionState)> {
        let index = self.written.checked_sub(1)?;
        Some((
            self.times[index],
            MotionState {
                position: self.positions[index],
                velocity: self.velocities[index],
            },
        ))
    }
}
