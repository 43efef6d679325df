use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FromPrimitive};

/// Marker trait for base floating-point types (`f32`, `f64`).
///
/// Bundles the numeric and utility traits needed throughout the crate.
/// Only primitive float types implement this — AD wrapper types do not.
/// Sweeps that also need the base float to act as a tape scalar take an
/// additional `Scalar<Float = F>` bound at the method level, which keeps
/// [`crate::scalar::Scalar`]'s math methods out of scope (and unambiguous
/// with `num_traits::Float`'s) everywhere else.
pub trait Float:
    NumFloat + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
