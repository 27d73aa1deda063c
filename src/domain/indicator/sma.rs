//! Simple moving average over a series with undefined leading values.
//!
//! SMA(n)[i] = mean(x[i-n+1..=i]), defined only when all n inputs are defined.
//! The window is summed directly each step so averages of values bounded by
//! [lo, hi] stay within [lo, hi].

pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let sum = window.iter().try_fold(0.0, |acc, v| v.map(|x| acc + x))?;
            Some(sum / period as f64)
        })
        .collect()
}
