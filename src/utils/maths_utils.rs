use statrs::statistics::Statistics;

/// Clamp a raw score into the [0, 1] band used by all strength/score fields.
#[inline]
pub fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.mean()
}

pub fn std_dev(values: &[f64]) -> f64 {
    // Statistics::std_dev is the sample standard deviation (n - 1)
    if values.len() < 2 {
        return 0.0;
    }
    values.std_dev()
}

/// Pearson correlation coefficient over two equal-length sample slices.
/// Returns None when either side is degenerate (too short or zero variance) -
/// callers decide the fail-safe value, not us.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }

    let mean_x = xs.mean();
    let mean_y = ys.mean();

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    // Clamp handles floating-point overshoot just outside [-1, 1]
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

/// Log returns over consecutive closes. Output length = input length - 1.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_bounds() {
        assert_eq!(clip01(-0.5), 0.0);
        assert_eq!(clip01(1.5), 1.0);
        assert_eq!(clip01(0.42), 0.42);
    }

    #[test]
    fn pearson_perfect_positive() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        let r = pearson(&xs, &ys).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_perfect_negative() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [8.0, 6.0, 4.0, 2.0];
        let r = pearson(&xs, &ys).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_degenerate_is_none() {
        let flat = [5.0, 5.0, 5.0];
        let ramp = [1.0, 2.0, 3.0];
        assert!(pearson(&flat, &ramp).is_none());
        assert!(pearson(&ramp[..1], &flat[..1]).is_none());
    }

    #[test]
    fn log_returns_len() {
        let closes = [100.0, 101.0, 99.0];
        assert_eq!(log_returns(&closes).len(), 2);
    }
}
