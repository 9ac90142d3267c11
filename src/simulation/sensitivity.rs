// src/simulation/sensitivity.rs

//! 終端コストの cd と r に関する感度
//!
//! 主ループとは独立に、終端速度から閉形式の終端コストを勾配テープ上に組み立て、
//! 確定した記録に対して偏微分を問い合わせる。

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::{Parameter, PerturbationSettings, PhysicalParameters};
use crate::math::finite_difference::{central_difference, relative_step};
use crate::math::{GradientTape, Recording};
use crate::models::sphere::{record_terminal_cost, terminal_cost, TerminalCostInputs};
use crate::simulation::error::SimulationError;

/// 2回目の記録の前に cd と r に加える摂動
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Perturbation {
    pub drag_coefficient: f64,
    pub radius: f64,
}

impl Perturbation {
    /// 振幅 [-a, a] の一様乱数から摂動を生成する。振幅ゼロの成分はゼロのまま
    ///
    /// # 戻り値
    /// - 摂動。振幅が有限値でない場合 (区間幅 2a が溢れる場合を含む) は `InvalidSettings`
    pub fn sample(settings: &PerturbationSettings) -> Result<Self, SimulationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
        let mut draw = |name: &str, amplitude: f64| {
            let amplitude = amplitude.abs();
            if !(2.0 * amplitude).is_finite() {
                return Err(SimulationError::InvalidSettings(format!(
                    "摂動の振幅 {} は有限値である必要があります: {}",
                    name, amplitude
                )));
            }
            if amplitude == 0.0 {
                Ok(0.0)
            } else {
                Ok(rng.random_range(-amplitude..=amplitude))
            }
        };
        let drag_coefficient = draw("drag_coefficient", settings.drag_coefficient)?;
        let radius = draw("radius", settings.radius)?;
        Ok(Perturbation { drag_coefficient, radius })
    }

    pub fn is_zero(&self) -> bool {
        self.drag_coefficient == 0.0 && self.radius == 0.0
    }

    /// 摂動を加えたパラメータのコピー
    ///
    /// 摂動後の半径が正でない場合、または抗力係数が負になる場合は `InvalidSettings`
    pub fn apply(&self, params: &PhysicalParameters) -> Result<PhysicalParameters, SimulationError> {
        let drag_coefficient = params.drag_coefficient + self.drag_coefficient;
        let radius = params.radius + self.radius;
        if radius.is_nan() || radius <= 0.0 {
            return Err(SimulationError::InvalidSettings(format!(
                "摂動後の半径は正である必要があります: {}",
                radius
            )));
        }
        if drag_coefficient.is_nan() || drag_coefficient < 0.0 {
            return Err(SimulationError::InvalidSettings(format!(
                "摂動後の抗力係数は負にできません: {}",
                drag_coefficient
            )));
        }
        Ok(params
            .with(Parameter::DragCoefficient, drag_coefficient)
            .with(Parameter::Radius, radius))
    }
}

/// 1回の記録から得た終端コストと勾配
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityReport {
    pub parameters: PhysicalParameters,
    pub cost: f64,
    pub d_cost_d_drag_coefficient: Option<f64>,
    pub d_cost_d_radius: Option<f64>,
    pub joint: [Option<f64>; 2], // (cd, r) の順
}

/// 終端コストを永続テープに記録する
pub fn record_sensitivity(
    params: &PhysicalParameters,
    inputs: &TerminalCostInputs,
) -> Result<Recording<Parameter>, SimulationError> {
    let recording = GradientTape::record(true, |tape| record_terminal_cost(tape, params, inputs))?;
    Ok(recording)
}

/// 記録に対して cd, r の個別および同時の勾配を問い合わせる
pub fn extract_gradients(
    recording: &Recording<Parameter>,
    parameters: PhysicalParameters,
) -> Result<SensitivityReport, SimulationError> {
    let d_cost_d_drag_coefficient = recording.gradient(Parameter::DragCoefficient)?;
    let d_cost_d_radius = recording.gradient(Parameter::Radius)?;
    let joint = recording.gradients(&[Parameter::DragCoefficient, Parameter::Radius])?;
    Ok(SensitivityReport {
        parameters,
        cost: recording.value(),
        d_cost_d_drag_coefficient,
        d_cost_d_radius,
        joint: [joint[0], joint[1]],
    })
}

/// 記録と勾配の抽出をまとめて行う
pub fn evaluate_sensitivity(
    params: &PhysicalParameters,
    inputs: &TerminalCostInputs,
) -> Result<SensitivityReport, SimulationError> {
    let recording = record_sensitivity(params, inputs)?;
    extract_gradients(&recording, *params)
}

/// 摂動なし・摂動ありの2回の感度計算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityPasses {
    pub unperturbed: SensitivityReport,
    pub perturbation: Perturbation,
    pub perturbed: SensitivityReport,
}

/// 摂動なしと摂動ありで、それぞれ独立した記録から感度を求める
///
/// 終端速度と観測は両方の記録で共通 (主ループは再実行しない)。
pub fn run_sensitivity_passes(
    params: &PhysicalParameters,
    inputs: &TerminalCostInputs,
    perturbation: Perturbation,
) -> Result<SensitivityPasses, SimulationError> {
    let unperturbed = evaluate_sensitivity(params, inputs)?;
    let perturbed_params = perturbation.apply(params)?;
    let perturbed = evaluate_sensitivity(&perturbed_params, inputs)?;
    Ok(SensitivityPasses { unperturbed, perturbation, perturbed })
}

/// 中心差分による勾配
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientCheck {
    pub drag_coefficient: f64,
    pub radius: f64,
}

impl GradientCheck {
    /// テープの勾配との最大相対誤差。勾配がない成分は比較しない
    pub fn max_relative_error(&self, report: &SensitivityReport) -> f64 {
        [
            (report.d_cost_d_drag_coefficient, self.drag_coefficient),
            (report.d_cost_d_radius, self.radius),
        ]
        .into_iter()
        .filter_map(|(tape, numeric)| {
            tape.map(|t| (t - numeric).abs() / t.abs().max(f64::MIN_POSITIVE))
        })
        .fold(0.0, f64::max)
    }
}

/// 終端コストを cd と r について中心差分で微分する
pub fn finite_difference_check(
    params: &PhysicalParameters,
    inputs: &TerminalCostInputs,
) -> Result<GradientCheck, SimulationError> {
    let numeric = |parameter: Parameter| -> Result<f64, SimulationError> {
        let x = params.get(parameter);
        let d = central_difference(
            |value| terminal_cost(&params.with(parameter, value), inputs),
            x,
            relative_step(x),
        )?;
        Ok(d)
    };
    let check = GradientCheck {
        drag_coefficient: numeric(Parameter::DragCoefficient)?,
        radius: numeric(Parameter::Radius)?,
    };
    debug!(
        "finite difference: dfcost/dcd={:e} dfcost/dr={:e}",
        check.drag_coefficient, check.radius
    );
    Ok(check)
}
