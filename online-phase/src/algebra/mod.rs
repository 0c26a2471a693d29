//! Defines algebraic MPC types and operations on them

mod field;
mod macros;
mod scalar;

pub use field::*;
pub use scalar::*;
