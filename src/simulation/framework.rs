// src/simulation/framework.rs

use tracing::info;

use crate::config::{PhysicalParameters, SimulationSettings};
use crate::math::MotionState;
use crate::models::sphere::{advance, TerminalCostInputs};
use crate::simulation::cost::CostAccumulator;
use crate::simulation::error::SimulationError;
use crate::simulation::observations::ObservationSeries;
use crate::simulation::trajectory::Trajectory;

// 時間グリッドの最大ステップ数
pub const MAX_STEPS: usize = 10_000_000;

/// 時間グリッドのステップ数 N = ceil((T - dt) / dt)
///
/// 時刻 dt から T (T を含まない) まで dt 刻みで並べたときの要素数。
pub fn step_count(settings: &SimulationSettings) -> Result<usize, SimulationError> {
    let SimulationSettings { dt, end_time } = *settings;
    if !dt.is_finite() || dt <= 0.0 {
        return Err(SimulationError::InvalidSettings(format!(
            "dt は正の有限値である必要があります: {}",
            dt
        )));
    }
    if !end_time.is_finite() || end_time <= dt {
        return Err(SimulationError::InvalidSettings(format!(
            "end_time ({}) は dt ({}) より大きい必要があります",
            end_time, dt
        )));
    }
    let steps = ((end_time - dt) / dt).ceil();
    if !steps.is_finite() || steps > MAX_STEPS as f64 {
        return Err(SimulationError::InvalidSettings(format!(
            "ステップ数 {:e} が上限 {} を超えています (dt: {}, end_time: {})",
            steps, MAX_STEPS, dt, end_time
        )));
    }
    Ok(steps as usize)
}

/// 時間グリッド t_k = dt + k·dt (k = 0..N)
pub fn time_grid(settings: &SimulationSettings) -> Result<Vec<f64>, SimulationError> {
    let n = step_count(settings)?;
    Ok((0..n).map(|k| settings.dt + k as f64 * settings.dt).collect())
}

/// 主ループの結果
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub trajectory: Trajectory,
    pub cost: CostAccumulator,
    pub cost_norm: f64,
    pub final_state: MotionState,
    pub final_observation: f64,
    pub dt: f64,
}

impl SimulationOutcome {
    pub fn steps(&self) -> usize {
        self.cost.count()
    }

    /// 終端コストの再評価に使う値
    pub fn terminal_inputs(&self) -> TerminalCostInputs {
        TerminalCostInputs {
            terminal_velocity: self.final_state.velocity,
            final_observation: self.final_observation,
            dt: self.dt,
            steps: self.steps(),
        }
    }
}

/// 静止状態から時間グリッドに沿って積分し、観測位置との残差を累積する
///
/// # 引数
/// - `params`: 物理パラメータ
/// - `settings`: 時間刻みと終了時刻
/// - `observations`: 観測データ (N 行以上)
///
/// # 戻り値
/// - 軌跡、コスト、終端状態
pub fn run_simulation(
    params: &PhysicalParameters,
    settings: &SimulationSettings,
    observations: &ObservationSeries,
) -> Result<SimulationOutcome, SimulationError> {
    let times = time_grid(settings)?;
    // 観測が足りない場合はコストを計算する前に止める
    let observed = observations.require(times.len())?;

    let mut state = MotionState::default();
    let mut trajectory = Trajectory::with_len(times.len());
    let mut cost = CostAccumulator::new();

    for (i, (&time, observation)) in times.iter().zip(observed).enumerate() {
        state = advance(state, params, settings.dt)?;
        trajectory.record(i, time, state)?;
        info!(
            "t={:.6} z={:.6} z_obs={:.6}",
            time, state.position, observation.position
        );
        cost.add_residual(observation.position, state.position);
    }

    let cost_norm = cost.normalized()?;
    let final_observation = observed
        .last()
        .map(|o| o.position)
        .ok_or(SimulationError::EmptyCost)?;

    Ok(SimulationOutcome {
        trajectory,
        cost,
        cost_norm,
        final_state: state,
        final_observation,
        dt: settings.dt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameter;
    use crate::simulation::observations::{synthesize_observations, Observation};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn free_fall() -> PhysicalParameters {
        PhysicalParameters { drag_coefficient: 0.0, ..Default::default() }
    }

    #[test]
    fn test_step_count_follows_half_open_grid() {
        assert_eq!(step_count(&SimulationSettings::default()).unwrap(), 99);
        assert_eq!(step_count(&SimulationSettings { dt: 0.1, end_time: 1.0 }).unwrap(), 9);
        assert_eq!(step_count(&SimulationSettings { dt: 0.25, end_time: 1.0 }).unwrap(), 3);
    }

    #[test]
    fn test_time_grid_values() {
        let grid = time_grid(&SimulationSettings { dt: 0.25, end_time: 1.0 }).unwrap();
        assert_eq!(grid, vec![0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            step_count(&SimulationSettings { dt: 0.0, end_time: 1.0 }),
            Err(SimulationError::InvalidSettings(_))
        ));
        assert!(matches!(
            step_count(&SimulationSettings { dt: 0.1, end_time: 0.1 }),
            Err(SimulationError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_step_count_is_bounded() {
        let tiny = SimulationSettings { dt: 1e-300, end_time: 1.0 };
        assert!(matches!(step_count(&tiny), Err(SimulationError::InvalidSettings(_))));
        assert!(matches!(time_grid(&tiny), Err(SimulationError::InvalidSettings(_))));

        let at_limit = SimulationSettings { dt: 1.0, end_time: MAX_STEPS as f64 + 1.0 };
        assert_eq!(step_count(&at_limit).unwrap(), MAX_STEPS);
        let over_limit = SimulationSettings { dt: 1.0, end_time: MAX_STEPS as f64 + 2.0 };
        assert!(matches!(step_count(&over_limit), Err(SimulationError::InvalidSettings(_))));
    }

    /// test_free_fall_matches_closed_form
    /// 抗力なしでは u_k = -g t_k が厳密に成り立ち、
    /// z は -g t²/2 との差が 1ステップ分の離散化誤差 g·dt·t/2 に一致する。
    #[test]
    fn test_free_fall_matches_closed_form() {
        let g = 9.81;
        for dt in [0.1, 0.05, 0.01] {
            let settings = SimulationSettings { dt, end_time: 2.0 };
            let observations = synthesize_observations(&free_fall(), &settings).unwrap();
            let outcome = run_simulation(&free_fall(), &settings, &observations).unwrap();
            let trajectory = &outcome.trajectory;

            for ((t, z), u) in trajectory
                .times()
                .iter()
                .zip(trajectory.positions())
                .zip(trajectory.velocities())
            {
                assert_abs_diff_eq!(*u, -g * t, epsilon = 1e-9);
                let exact = -g * t * t / 2.0;
                assert_abs_diff_eq!(z - exact, g * dt * t / 2.0, epsilon = 1e-9);
            }
        }
    }

    /// test_velocity_is_monotonic_and_bounded
    /// 静止状態から u は単調に減少し、|u| は終端速度 √(g/β) を超えない。
    #[test]
    fn test_velocity_is_monotonic_and_bounded() {
        let params = PhysicalParameters::default();
        let settings = SimulationSettings { dt: 0.1, end_time: 20.0 };
        let observations = synthesize_observations(&params, &settings).unwrap();
        let outcome = run_simulation(&params, &settings, &observations).unwrap();
        let terminal = params.terminal_velocity().unwrap().unwrap();

        let velocities = outcome.trajectory.velocities();
        for pair in velocities.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        for u in velocities {
            assert!(u.abs() < terminal.abs());
        }
        // 十分時間が経てば終端速度に近づく
        assert_relative_eq!(*velocities.last().unwrap(), terminal, max_relative = 1e-3);
    }

    /// test_end_to_end_free_fall
    /// dt=0.1, T=1.0, cd=0 で観測が積分と一致する場合、コストはほぼゼロで
    /// 最後の速度は -9.81 * 0.9 = -8.829 になる。
    #[test]
    fn test_end_to_end_free_fall() {
        let settings = SimulationSettings { dt: 0.1, end_time: 1.0 };
        let observations = synthesize_observations(&free_fall(), &settings).unwrap();
        let outcome = run_simulation(&free_fall(), &settings, &observations).unwrap();

        assert_eq!(outcome.steps(), 9);
        assert_eq!(outcome.trajectory.len(), 9);
        assert!(outcome.trajectory.is_complete());
        assert_abs_diff_eq!(outcome.cost_norm, 0.0, epsilon = 1e-20);
        assert_relative_eq!(*outcome.trajectory.velocities().last().unwrap(), -8.829, epsilon = 1e-9);
        assert_eq!(outcome.final_observation, observations.rows()[8].position);
    }

    /// test_cost_against_analytic_observations
    /// 厳密解 -g t²/2 を観測とした場合、残差は離散化誤差 g·dt·t/2 だけになる。
    #[test]
    fn test_cost_against_analytic_observations() {
        let g = 9.81;
        let settings = SimulationSettings { dt: 0.1, end_time: 1.0 };
        let rows = time_grid(&settings)
            .unwrap()
            .into_iter()
            .map(|t| Observation { time: t, position: -g * t * t / 2.0 })
            .collect::<Vec<_>>();
        let expected = rows
            .iter()
            .map(|o| (g * 0.1 * o.time / 2.0).powi(2))
            .sum::<f64>()
            / rows.len() as f64;
        let outcome = run_simulation(&free_fall(), &settings, &ObservationSeries::new(rows)).unwrap();

        assert_relative_eq!(outcome.cost_norm, expected, max_relative = 1e-9);
        assert_relative_eq!(outcome.cost.sum() / 9.0, outcome.cost_norm);
    }

    #[test]
    fn test_short_observations_are_fatal() {
        let settings = SimulationSettings::default();
        let short = synthesize_observations(&PhysicalParameters::default(), &SimulationSettings {
            dt: 0.1,
            end_time: 5.0,
        })
        .unwrap();
        let result = run_simulation(&PhysicalParameters::default(), &settings, &short);

        assert!(matches!(
            result,
            Err(SimulationError::InsufficientObservations { required: 99, available: 49 })
        ));
    }

    #[test]
    fn test_extra_observation_rows_are_ignored() {
        let params = PhysicalParameters::default();
        let long = synthesize_observations(&params, &SimulationSettings { dt: 0.1, end_time: 3.0 })
            .unwrap();
        let settings = SimulationSettings { dt: 0.1, end_time: 1.0 };
        let outcome = run_simulation(&params, &settings, &long).unwrap();

        assert_eq!(outcome.steps(), 9);
        assert_eq!(outcome.final_observation, long.rows()[8].position);
        assert_abs_diff_eq!(outcome.cost_norm, 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_zero_radius_is_fatal() {
        let params = PhysicalParameters::default().with(Parameter::Radius, 0.0);
        let settings = SimulationSettings { dt: 0.1, end_time: 1.0 };
        let observations = synthesize_observations(&free_fall(), &settings).unwrap();
        let result = run_simulation(&params, &settings, &observations);

        assert!(matches!(result, Err(SimulationError::Math(_))));
    }

    /// 書き込まれたログを共有バッファに集める
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// test_step_lines_are_logged_at_info
    /// 既定のフィルタ (info) のままで、各ステップの t, z, z_obs が出力される。
    #[test]
    fn test_step_lines_are_logged_at_info() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let settings = SimulationSettings { dt: 0.1, end_time: 1.0 };
        let observations = synthesize_observations(&free_fall(), &settings).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            run_simulation(&free_fall(), &settings, &observations).unwrap();
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines = output.lines().filter(|line| line.contains(" z_obs=")).collect::<Vec<_>>();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].contains("t=0.100000 z=0.000000 z_obs=0.000000"));
        assert!(lines[8].contains("t=0.900000"));
    }
}
