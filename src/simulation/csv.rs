// src/simulation/csv.rs

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::simulation::error::SimulationError;
use crate::simulation::observations::Observation;
use crate::simulation::trajectory::Trajectory;

/// CSV出力の設定とヘッダーの書き込み
pub fn setup_csv_output<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>, SimulationError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let output_file = File::create(path)?;
    let mut writer = BufWriter::new(output_file);
    write_csv_header(&mut writer)?;
    Ok(writer)
}

/// CSVヘッダーの書き込み
pub fn write_csv_header<W: Write>(writer: &mut W) -> Result<(), std::io::Error> {
    writer.write_all(b"time(s),z(m),u(m/s),z_obs(m)\n")
}

/// CSV行の作成
pub fn create_csv_row(time: f64, position: f64, velocity: f64, observed: f64) -> String {
    format!("{},{},{},{}\n", time, position, velocity, observed)
}

/// 軌跡と観測を1ステップ1行で書き出す
pub fn write_trajectory<W: Write>(
    writer: &mut W,
    trajectory: &Trajectory,
    observations: &[Observation],
) -> Result<(), std::io::Error> {
    for (((time, position), velocity), observation) in trajectory
        .times()
        .iter()
        .zip(trajectory.positions())
        .zip(trajectory.velocities())
        .zip(observations)
    {
        let row = create_csv_row(*time, *position, *velocity, observation.position);
        writer.write_all(row.as_bytes())?;
    }
    writer.flush()
}
