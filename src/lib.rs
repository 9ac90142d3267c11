// src/lib.rs

//! 空気抵抗を受けて落下する球の軌道計算と、観測データに対する
//! 終端コストの抗力係数・半径に関する感度 (逆モード自動微分) の計算。

pub mod config;
pub mod math;
pub mod models;
pub mod simulation;
