// src/math/finite_difference.rs

/// 相対刻み幅の係数
pub const RELATIVE_STEP: f64 = 1e-6;

/// 中心差分による数値微分
///
/// 打ち切り誤差は O(h²)、丸め誤差は O(ε/h) 程度。
///
/// # 引数
/// - `f`: 微分する関数
/// - `x`: 評価点
/// - `h`: 刻み幅 (正)
///
/// # 戻り値
/// - (f(x + h) - f(x - h)) / 2h。`f` のエラーはそのまま返す
pub fn central_difference<F, E>(f: F, x: f64, h: f64) -> Result<f64, E>
where
    F: Fn(f64) -> Result<f64, E>,
{
    Ok((f(x + h)? - f(x - h)?) / (2.0 * h))
}

/// 評価点の大きさに合わせた刻み幅 h = RELATIVE_STEP · max(|x|, 1)
pub fn relative_step(x: f64) -> f64 {
    RELATIVE_STEP * x.abs().max(1.0)
}
