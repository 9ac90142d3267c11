// src/models/sphere.rs

//! 空気中を自由落下する球のモデル
//!
//! m du/dt = -m g - ρₐ cd A |u|u, m = ρₒ (4/3) π r³, A = π r²
//! を整理すると du/dt = -g - β|u|u, β = 3 ρₐ cd / (ρₒ r) となる。

use crate::config::{Parameter, PhysicalParameters};
use crate::math::{explicit_euler_step, GradientTape, MathError, MotionState, Var};

/// 加速度 du/dt = -g - β|u|u
///
/// # 引数
/// - `params`: 物理パラメータ (β はここから毎回計算する)
/// - `velocity`: 現在の速度 u
pub fn drag_acceleration(params: &PhysicalParameters, velocity: f64) -> Result<f64, MathError> {
    let beta = params.beta()?;
    Ok(-params.gravity - beta * velocity.abs() * velocity)
}

/// 状態を1ステップ進める
pub fn advance(
    state: MotionState,
    params: &PhysicalParameters,
    dt: f64,
) -> Result<MotionState, MathError> {
    let acceleration = drag_acceleration(params, state.velocity)?;
    explicit_euler_step(state, acceleration, dt)
}

/// 終端コストに必要な量
///
/// 終端速度から合成した1ステップ分の変位を最後の観測位置と比較する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalCostInputs {
    pub terminal_velocity: f64, // 主ループ終了時の u
    pub final_observation: f64, // obs[N-1]
    pub dt: f64,
    pub steps: usize, // N
}

impl TerminalCostInputs {
    fn divisor(&self) -> Result<f64, MathError> {
        if self.steps == 0 {
            return Err(MathError::DivisionByZero { quantity: "terminal cost (step count)" });
        }
        Ok(self.steps as f64)
    }
}

/// 終端コスト
/// fcost = (obs[N-1] - dt·(dt·(-g - (3ρₐcd/(ρₒr))·|u|·u)))² / N
pub fn terminal_cost(
    params: &PhysicalParameters,
    inputs: &TerminalCostInputs,
) -> Result<f64, MathError> {
    let n = inputs.divisor()?;
    let acceleration = drag_acceleration(params, inputs.terminal_velocity)?;
    let residual = inputs.final_observation - inputs.dt * (inputs.dt * acceleration);
    Ok(residual.powi(2) / n)
}

/// 終端コストをテープ上に組み立てる
///
/// 5つの物理パラメータすべてを監視対象として登録する。
pub fn record_terminal_cost<'t>(
    tape: &'t GradientTape<Parameter>,
    params: &PhysicalParameters,
    inputs: &TerminalCostInputs,
) -> Result<Var<'t, Parameter>, MathError> {
    let n = inputs.divisor()?;
    // β が定義できない場合は記録前に止める
    params.beta()?;

    let g = tape.watch(Parameter::Gravity, params.gravity);
    let rho_o = tape.watch(Parameter::ObjectDensity, params.object_density);
    let r = tape.watch(Parameter::Radius, params.radius);
    let cd = tape.watch(Parameter::DragCoefficient, params.drag_coefficient);
    let rho_a = tape.watch(Parameter::AirDensity, params.air_density);

    let u = tape.constant(inputs.terminal_velocity);
    let beta = 3.0 * rho_a * cd / (rho_o * r);
    let acceleration = -g - beta * u.abs() * u;
    let residual = inputs.final_observation - inputs.dt * (inputs.dt * acceleration);
    Ok(residual.powi(2) / n)
}
