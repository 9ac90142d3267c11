// src/main.rs

use std::error::Error;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use dragfit::simulation::csv::{setup_csv_output, write_trajectory};
use dragfit::simulation::load_parameters::load_scenario;
use dragfit::simulation::sensitivity::finite_difference_check;
use dragfit::simulation::{
    load_observations, run_sensitivity_passes, run_simulation, Perturbation, SensitivityReport,
};

const DEFAULT_CONFIG: &str = "config/parameters.yaml";

// 中心差分との相対誤差がこれを超えたら警告する
const GRADIENT_CHECK_TOLERANCE: f64 = 1e-4;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // 設定と観測データの読み込み
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| String::from(DEFAULT_CONFIG));
    let scenario = load_scenario(&config_path)?;
    info!(config = %config_path, "loaded scenario");
    let observations = load_observations(&scenario.observation_file)?;
    info!(
        file = %scenario.observation_file,
        rows = observations.len(),
        "loaded observations"
    );

    // 主ループ
    let params = scenario.physical;
    let outcome = run_simulation(&params, &scenario.simulation, &observations)?;
    if let Some((time, state)) = outcome.trajectory.last() {
        info!(
            steps = outcome.steps(),
            time,
            position = state.position,
            velocity = state.velocity,
            "integration finished"
        );
    }
    if let Some(terminal) = params.terminal_velocity()? {
        info!(terminal_velocity = terminal, "terminal velocity -sqrt(g/beta)");
    }
    println!("cost_norm={:.6}", outcome.cost_norm);

    // CSV出力 (時刻ごとの位置・速度・観測位置)
    let mut writer = setup_csv_output(&scenario.output_file)?;
    write_trajectory(
        &mut writer,
        &outcome.trajectory,
        observations.require(outcome.steps())?,
    )?;
    info!(file = %scenario.output_file, "wrote trajectory");

    // 終端コストの感度
    let inputs = outcome.terminal_inputs();
    let perturbation = Perturbation::sample(&scenario.perturbation)?;
    if perturbation.is_zero() {
        info!("perturbation amplitudes are zero; the perturbed pass repeats the unperturbed one");
    }
    let passes = run_sensitivity_passes(&params, &inputs, perturbation)?;

    let check = finite_difference_check(&params, &inputs)?;
    let error = check.max_relative_error(&passes.unperturbed);
    if error > GRADIENT_CHECK_TOLERANCE {
        warn!(relative_error = error, "tape gradients disagree with finite differences");
    } else {
        debug!(relative_error = error, "tape gradients agree with finite differences");
    }

    print_report(&passes.unperturbed);
    println!(
        "small random perturbation (dcd={:.6}, dr={:.6})",
        passes.perturbation.drag_coefficient, passes.perturbation.radius
    );
    print_report(&passes.perturbed);
    println!(
        "grad(fcost) wrt (cd,r) = [{} {}]",
        format_gradient(passes.perturbed.joint[0]),
        format_gradient(passes.perturbed.joint[1])
    );

    Ok(())
}

fn print_report(report: &SensitivityReport) {
    println!("f_cost={:.6}", report.cost);
    println!("dfcost/dcd={}", format_gradient(report.d_cost_d_drag_coefficient));
    println!("dfcost/dr={}", format_gradient(report.d_cost_d_radius));
}

/// 勾配がない場合は None と表示する
fn format_gradient(gradient: Option<f64>) -> String {
    gradient
        .map(|value| format!("{:.6}", value))
        .unwrap_or_else(|| String::from("None"))
}
