// src/math/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("{quantity} の分母がゼロです。")]
    DivisionByZero { quantity: &'static str },
    #[error("時間刻み dt は正の有限値である必要があります: {0}")]
    InvalidTimeStep(f64),
    #[error("{quantity} が有限値ではありません。")]
    NonFinite { quantity: &'static str },
}

/// 勾配テープのエラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TapeError {
    #[error("非永続テープは既に勾配計算に使用され、解放されています。")]
    Released,
}
