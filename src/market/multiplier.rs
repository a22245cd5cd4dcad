//! Score multiplier from market-cap movement

/// Map a baseline and current market value to a score multiplier.
///
/// `1 + relative_change * sensitivity`, floored at `floor`. There is no upper
/// bound. A non-positive baseline means "no reference yet" and yields 1.
pub fn compute_multiplier(baseline: f64, current: f64, sensitivity: f64, floor: f64) -> f64 {
    // Also catches a NaN baseline
    if !(baseline > 0.0) {
        return 1.0;
    }
    let change = (current - baseline) / baseline;
    let raw = 1.0 + change * sensitivity;
    // f64::max drops a NaN operand, so a degenerate raw value lands on the floor
    raw.max(floor)
}
