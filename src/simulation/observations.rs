// src/simulation/observations.rs

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::config::{PhysicalParameters, SimulationSettings};
use crate::math::MotionState;
use crate::models::sphere::advance;
use crate::simulation::error::SimulationError;
use crate::simulation::framework::time_grid;

/// 観測データの1行
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub time: f64,     // 列0: 時刻 (表示用)
    pub position: f64, // 列1: 観測位置
}

/// 観測データ列
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationSeries {
    rows: Vec<Observation>,
}

impl ObservationSeries {
    pub fn new(rows: Vec<Observation>) -> Self {
        ObservationSeries { rows }
    }

    /// 空白区切りのテキストを読み込む
    ///
    /// 空行と `#` で始まる行は無視する。3列目以降は使わない。
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SimulationError> {
        let mut rows = Vec::new();
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            rows.push(parse_row(index + 1, trimmed)?);
        }
        Ok(ObservationSeries { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    /// 先頭 `steps` 行が揃っていることを確認する
    pub fn require(&self, steps: usize) -> Result<&[Observation], SimulationError> {
        self.rows
            .get(..steps)
            .ok_or(SimulationError::InsufficientObservations {
                required: steps,
                available: self.rows.len(),
            })
    }
}

fn parse_row(line: usize, text: &str) -> Result<Observation, SimulationError> {
    let mut columns = text.split_whitespace();
    let mut next_value = |name: &str| -> Result<f64, SimulationError> {
        let raw = columns.next().ok_or_else(|| SimulationError::MalformedObservation {
            line,
            reason: format!("{} の列がありません", name),
        })?;
        raw.parse::<f64>().map_err(|e| SimulationError::MalformedObservation {
            line,
            reason: format!("{} '{}' を数値に変換できません: {}", name, raw, e),
        })
    };
    let time = next_value("time")?;
    let position = next_value("position")?;
    Ok(Observation { time, position })
}

/// 観測データファイルの読み込み
pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<ObservationSeries, SimulationError> {
    let file = File::open(path)?;
    ObservationSeries::from_reader(file)
}

/// モデルと同じ積分で合成した観測データ
///
/// 各行は (時刻, 位置) で、同じパラメータで積分した軌跡と完全に一致する。
pub fn synthesize_observations(
    params: &PhysicalParameters,
    settings: &SimulationSettings,
) -> Result<ObservationSeries, SimulationError> {
    let times = time_grid(settings)?;
    let mut state = MotionState::default();
    let mut rows = Vec::with_capacity(times.len());
    for time in times {
        state = advance(state, params, settings.dt)?;
        rows.push(Observation { time, position: state.position });
    }
    Ok(ObservationSeries { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_reader_parses_whitespace_columns() {
        let text = "# time z u\n0.1 0.0 -0.98\n\n0.2\t-0.098   -1.9\n";
        let series = ObservationSeries::from_reader(text.as_bytes()).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.rows()[0], Observation { time: 0.1, position: 0.0 });
        assert_eq!(series.rows()[1], Observation { time: 0.2, position: -0.098 });
    }

    #[test]
    fn test_from_reader_reports_missing_column() {
        let result = ObservationSeries::from_reader("0.1 0.0\n0.2\n".as_bytes());

        match result {
            Err(SimulationError::MalformedObservation { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_reader_reports_non_numeric_value() {
        let result = ObservationSeries::from_reader("0.1 abc\n".as_bytes());

        assert!(matches!(result, Err(SimulationError::MalformedObservation { line: 1, .. })));
    }

    #[test]
    fn test_require_rejects_short_series() {
        let series = ObservationSeries::new(vec![Observation { time: 0.1, position: 0.0 }]);

        assert_eq!(series.require(1).unwrap().len(), 1);
        assert!(matches!(
            series.require(3),
            Err(SimulationError::InsufficientObservations { required: 3, available: 1 })
        ));
    }

    #[test]
    fn test_synthesize_observations_free_fall() {
        let params = PhysicalParameters { drag_coefficient: 0.0, ..Default::default() };
        let settings = SimulationSettings { dt: 0.1, end_time: 1.0 };
        let series = synthesize_observations(&params, &settings).unwrap();

        // Euler: z_n = -g dt² n(n-1)/2
        assert_eq!(series.len(), 9);
        assert_relative_eq!(series.rows()[8].time, 0.9, epsilon = 1e-12);
        assert_relative_eq!(series.rows()[8].position, -9.81 * 0.01 * 36.0, epsilon = 1e-9);
    }
}
