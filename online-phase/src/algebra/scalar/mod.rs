//! Scalar type arithmetic with plaintext and shared authenticated types
#![allow(clippy::module_inception)]

mod scalar;
mod share;

pub use scalar::*;
pub use share::*;
