use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for base floating-point types (`f32`, `f64`).
///
/// Bundles the numeric and utility traits the sweep needs. Only primitive
/// float types implement this.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// Convert a Taylor order (or other small count) to `Self`.
    #[inline]
    fn from_order(k: usize) -> Self {
        <Self as FromPrimitive>::from_usize(k).unwrap_or_else(Self::nan)
    }
}

impl Float for f32 {}
impl Float for f64 {}
