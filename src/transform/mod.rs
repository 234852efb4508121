//! The canonical-space transforms: probit normalization of inputs,
//! standardization of outputs, and orthogonal rotation of the normalized
//! input space.

pub mod normalization;
pub mod probit;
pub mod rotation;

pub use normalization::{Normalization, Stats, UNIFORM_MARGIN};
