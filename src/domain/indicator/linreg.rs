//! Rolling linear-regression projection.
//!
//! LINREG(n)[i] fits y = a + b*x by ordinary least squares to the trailing n
//! values against x = 0..n-1 and evaluates the line at x = n-1.
//! Warmup: first (n-1) values are missing, as is any window holding a
//! non-finite value.

pub fn linreg(close: &[f64], length: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; close.len()];
    if length == 0 || close.len() < length {
        return values;
    }

    let n = length as f64;
    let sum_x = n * (n - 1.0) / 2.0;
    let sum_x2 = (n - 1.0) * n * (2.0 * n - 1.0) / 6.0;
    let denom = n * sum_x2 - sum_x * sum_x;

    for i in (length - 1)..close.len() {
        let window = &close[i + 1 - length..=i];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        if length == 1 {
            values[i] = Some(window[0]);
            continue;
        }
        let sum_y: f64 = window.iter().sum();
        let sum_xy: f64 = window
            .iter()
            .enumerate()
            .map(|(x, y)| x as f64 * y)
            .sum();
        let slope = (n * sum_xy - sum_x * sum_y) / denom;
        let intercept = (sum_y - slope * sum_x) / n;
        values[i] = Some(intercept + slope * (n - 1.0));
    }

    values
}
