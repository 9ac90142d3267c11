// src/config/parameters.rs

use serde::Deserialize;

use crate::math::MathError;

/// 物理パラメータの識別子 (勾配テープのキー)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Gravity,
    ObjectDensity,
    Radius,
    DragCoefficient,
    AirDensity,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::Gravity,
        Parameter::ObjectDensity,
        Parameter::Radius,
        Parameter::DragCoefficient,
        Parameter::AirDensity,
    ];
}

/// 落下する球の物理パラメータ
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PhysicalParameters {
    pub gravity: f64,          // 重力加速度 g (m/s²)
    pub object_density: f64,   // 物体の密度 ρₒ (kg/m³)
    pub radius: f64,           // 球の半径 r (m)
    pub drag_coefficient: f64, // 抗力係数 cd
    pub air_density: f64,      // 空気の密度 ρₐ (kg/m³)
}

impl Default for PhysicalParameters {
    fn default() -> Self {
        PhysicalParameters {
            gravity: 9.81,
            object_density: 1000.0,
            radius: 0.05,
            drag_coefficient: 0.45,
            air_density: 1.25,
        }
    }
}

impl PhysicalParameters {
    /// 抗力係数 β = 3·ρₐ·cd / (ρₒ·r)
    ///
    /// 呼び出しのたびに現在の値から計算し直す。
    pub fn beta(&self) -> Result<f64, MathError> {
        let denominator = self.object_density * self.radius;
        if denominator == 0.0 {
            return Err(MathError::DivisionByZero { quantity: "beta (object_density * radius)" });
        }
        let beta = 3.0 * self.air_density * self.drag_coefficient / denominator;
        if !beta.is_finite() {
            return Err(MathError::NonFinite { quantity: "beta" });
        }
        Ok(beta)
    }

    /// 終端速度 -√(g/β)。抗力がない場合は None
    pub fn terminal_velocity(&self) -> Result<Option<f64>, MathError> {
        let beta = self.beta()?;
        if beta <= 0.0 {
            return Ok(None);
        }
        Ok(Some(-(self.gravity / beta).sqrt()))
    }

    pub fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Gravity => self.gravity,
            Parameter::ObjectDensity => self.object_density,
            Parameter::Radius => self.radius,
            Parameter::DragCoefficient => self.drag_coefficient,
            Parameter::AirDensity => self.air_density,
        }
    }

    /// 1つのパラメータだけを置き換えたコピーを返す
    pub fn with(&self, parameter: Parameter, value: f64) -> Self {
        let mut updated = *self;
        match parameter {
            Parameter::Gravity => updated.gravity = value,
            Parameter::ObjectDensity => updated.object_density = value,
            Parameter::Radius => updated.radius = value,
            Parameter::DragCoefficient => updated.drag_coefficient = value,
            Parameter::AirDensity => updated.air_density = value,
        }
        updated
    }
}

/// 時間積分の設定
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    pub dt: f64,       // 時間刻み (s)
    pub end_time: f64, // 終了時刻 T (s)、この時刻自体は含まない
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings { dt: 0.1, end_time: 10.0 }
    }
}

/// 2回目の感度計算の前に cd と r に加える摂動の振幅
///
/// 振幅がゼロ (既定) の場合は摂動なし。
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PerturbationSettings {
    pub drag_coefficient: f64, // cd の一様乱数の振幅
    pub radius: f64,           // r の一様乱数の振幅
    pub seed: u64,
}

impl Default for PerturbationSettings {
    fn default() -> Self {
        PerturbationSettings {
            drag_coefficient: 0.0,
            radius: 0.0,
            seed: 42,
        }
    }
}
