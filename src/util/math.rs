//! Small numeric helpers shared by anchor generation and assignment.

/// Integer division rounding up; `divisor` must be non-zero.
pub(crate) fn ceil_div(value: usize, divisor: usize) -> usize {
    value.div_ceil(divisor)
}

/// Rounds to the nearest integer, resolving `.5` to the even neighbour.
pub(crate) fn round_half_even(value: f32) -> f32 {
    value.round_ties_even()
}

/// Squared Euclidean distance between two `(y, x)` points.
pub(crate) fn squared_distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dy = a.0 - b.0;
    let dx = a.1 - b.1;
    dy * dy + dx * dx
}

/// Returns true when `value` is finite and within `[0, 1]`.
pub(crate) fn is_unit_interval(value: f32) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}
