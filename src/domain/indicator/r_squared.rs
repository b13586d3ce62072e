//! Rolling coefficient of determination against time, and its smoothing.
//!
//! R2(n)[i] is the squared Pearson correlation between the trailing n values
//! and the positions 0..n-1. It measures how linear the recent trend is and is
//! reported on the unit scale [0, 1]. A flat window has no defined
//! correlation and yields a missing value.

pub fn rolling_r2(values: &[f64], length: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if length < 2 || values.len() < length {
        return out;
    }

    let n = length as f64;
    let mean_x = (n - 1.0) / 2.0;
    let var_x: f64 = (0..length).map(|x| (x as f64 - mean_x).powi(2)).sum();

    for i in (length - 1)..values.len() {
        let window = &values[i + 1 - length..=i];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        let mean_y = window.iter().sum::<f64>() / n;
        let mut cov = 0.0;
        let mut var_y = 0.0;
        for (x, y) in window.iter().enumerate() {
            let dy = y - mean_y;
            cov += (x as f64 - mean_x) * dy;
            var_y += dy * dy;
        }
        if var_y <= f64::EPSILON * mean_y.abs().max(1.0) {
            continue;
        }
        let r2 = cov * cov / (var_x * var_y);
        out[i] = Some(r2.clamp(0.0, 1.0));
    }

    out
}

/// Trailing simple moving average of `r2` over `length` points. A window
/// containing a missing value is itself missing.
pub fn smoothed_r2(r2: &[Option<f64>], length: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; r2.len()];
    if length == 0 || r2.len() < length {
        return out;
    }
    for i in (length - 1)..r2.len() {
        let window = &r2[i + 1 - length..=i];
        let sum: Option<f64> = window.iter().copied().sum();
        out[i] = sum.map(|s| s / length as f64);
    }
    out
}
