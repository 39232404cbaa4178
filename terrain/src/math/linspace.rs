use num_traits::{Float, FromPrimitive};

/// `n` evenly spaced values from `y_start` to `y_end` inclusive.
///
/// A single value is `y_start`.
pub fn linspace<T>(y_start: T, y_end: T, n: usize) -> impl Iterator<Item = T>
where
    T: Float + FromPrimitive,
{
    let steps = T::from_usize(n.saturating_sub(1).max(1)).unwrap_or_else(T::one);
    let span = y_end - y_start;
    (0..n).map(move |x| y_start + span * T::from_usize(x).unwrap_or_else(T::zero) / steps)
}
