use crate::models::Cell;

/// Round to `decimals` places, sending exact halves to the even neighbour.
///
/// Halves are judged on the exact binary value: `0.05` is stored slightly
/// above one half of `0.1`, so it rounds up even though `0.05 * 10` lands on
/// `0.5` exactly.
pub fn round_half_even(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    let scaled = value * scale;
    if !scaled.is_finite() || scaled.fract().abs() != 0.5 {
        return scaled.round_ties_even() / scale;
    }

    // The product may have been rounded onto the half. Every finite f64 has a
    // terminating expansion within 1074 fractional digits.
    let exact = format!("{:.1074}", value.abs());
    let dropped = exact
        .split_once('.')
        .and_then(|(_, frac)| frac.get(decimals as usize..))
        .unwrap_or("");
    let mut tail = dropped.bytes();
    let first = tail.next();
    let rest_is_zero = tail.all(|b| b == b'0');

    let truncated = scaled.abs().trunc();
    let magnitude = match first {
        Some(b'5') if rest_is_zero => scaled.abs().round_ties_even(),
        Some(d) if d >= b'5' => truncated + 1.0,
        _ => truncated,
    };
    magnitude.copysign(value) / scale
}

/// Numeric values of a column, skipping cells that do not coerce.
pub fn numeric_values<'a, I>(cells: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Cell>,
{
    cells.into_iter().filter_map(Cell::as_f64).collect()
}

/// Sample standard deviation (n - 1 denominator). `None` with fewer than two
/// values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}
