// src/simulation/error.rs

use thiserror::Error;

use crate::math::{MathError, TapeError};

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("ファイルの入出力に失敗しました: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAMLの読み込みに失敗しました: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("観測データ {line} 行目が不正です: {reason}")]
    MalformedObservation { line: usize, reason: String },
    #[error("観測データが不足しています (必要: {required} 行, 実際: {available} 行)")]
    InsufficientObservations { required: usize, available: usize },
    #[error("軌跡バッファの範囲外に書き込もうとしました (index: {index}, len: {len})")]
    TrajectoryOverflow { index: usize, len: usize },
    #[error("軌跡バッファへの書き込み順序が不正です (期待: {expected}, 実際: {index})")]
    TrajectoryOutOfOrder { index: usize, expected: usize },
    #[error("コストの正規化に必要なステップがありません。")]
    EmptyCost,
    #[error("シミュレーション設定が不正です: {0}")]
    InvalidSettings(String),
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Tape(#[from] TapeError),
}
