// src/math/integrator.rs

use crate::math::error::MathError;

/// 位置と速度からなる一次元の運動状態
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionState {
    pub position: f64, // 位置 z (m)
    pub velocity: f64, // 速度 u (m/s)
}

/// 前進Euler法による1ステップ積分
///
/// 位置・速度ともに更新前の速度を用いる。
///
/// # 引数
/// - `state`: 現在の状態 (z, u)
/// - `acceleration`: 現在の状態で評価した加速度 du/dt
/// - `dt`: 時間刻み
///
/// # 戻り値
/// - 次の状態 (z + dt·u, u + dt·a)
pub fn explicit_euler_step(
    state: MotionState,
    acceleration: f64,
    dt: f64,
) -> Result<MotionState, MathError> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(MathError::InvalidTimeStep(dt));
    }
    if !acceleration.is_finite() {
        return Err(MathError::NonFinite { quantity: "acceleration" });
    }
    Ok(MotionState {
        position: state.position + dt * state.velocity,
        velocity: state.velocity + dt * acceleration,
    })
}
