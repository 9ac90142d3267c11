// src/math/mod.rs

pub mod integrator;
pub mod tape;
pub mod finite_difference;
pub mod error;

pub use integrator::explicit_euler_step;
pub use integrator::MotionState;
pub use tape::{GradientTape, Recording, Var};
pub use error::{MathError, TapeError};
