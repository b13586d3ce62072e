//! RSI (Relative Strength Index).
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100, or 50 when avg_gain is also 0 (flat prices).
//!
//! Warmup: the first n values are missing (n price changes are needed).
//! A non-finite close poisons every later value, since the smoothed averages
//! carry it forward.

pub fn rsi(close: &[f64], length: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; close.len()];
    if length == 0 || close.len() <= length {
        return values;
    }

    let mut gains: Vec<f64> = Vec::with_capacity(close.len() - 1);
    let mut losses: Vec<f64> = Vec::with_capacity(close.len() - 1);
    for pair in close.windows(2) {
        let change = pair[1] - pair[0];
        let (gain, loss) = if !change.is_finite() {
            (f64::NAN, f64::NAN)
        } else if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        gains.push(gain);
        losses.push(loss);
    }

    let n = length as f64;
    let mut avg_gain = gains[..length].iter().sum::<f64>() / n;
    let mut avg_loss = losses[..length].iter().sum::<f64>() / n;
    values[length] = strength_index(avg_gain, avg_loss);

    for i in (length + 1)..close.len() {
        let change_idx = i - 1;
        avg_gain = (avg_gain * (n - 1.0) + gains[change_idx]) / n;
        avg_loss = (avg_loss * (n - 1.0) + losses[change_idx]) / n;
        values[i] = strength_index(avg_gain, avg_loss);
    }

    values
}

fn strength_index(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if !avg_gain.is_finite() || !avg_loss.is_finite() {
        return None;
    }
    let value = if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    };
    Some(value)
}
