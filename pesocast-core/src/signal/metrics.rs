//! Pure metric functions over error series and equity curves.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn mean_absolute_error(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64
}

pub fn root_mean_squared_error(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt()
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Percentile `q` in `[0, 100]` with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Value at risk of the error distribution: the `(1 - confidence)` percentile.
pub fn value_at_risk(errors: &[f64], confidence: f64) -> f64 {
    percentile(errors, (1.0 - confidence) * 100.0)
}

/// Mean of the errors at or below the value at risk.
pub fn conditional_value_at_risk(errors: &[f64], confidence: f64) -> f64 {
    let var = value_at_risk(errors, confidence);
    let tail: Vec<f64> = errors.iter().copied().filter(|&e| e <= var).collect();
    if tail.is_empty() {
        var
    } else {
        mean(&tail)
    }
}

/// Total return from first to last equity value.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Largest peak-to-trough decline as a negative fraction (0 when none).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 4.0);
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&v, 5.0) - 1.15).abs() < 1e-12);
    }

    #[test]
    fn var_and_cvar_sit_in_the_left_tail() {
        let errors: Vec<f64> = (-10..=10).map(|i| f64::from(i) * 0.01).collect();
        let var = value_at_risk(&errors, 0.95);
        let cvar = conditional_value_at_risk(&errors, 0.95);
        assert!((var - (-0.09)).abs() < 1e-12);
        assert!((cvar - (-0.095)).abs() < 1e-12);
        assert!(cvar <= var);
    }

    #[test]
    fn error_metrics() {
        let e = [0.1, -0.2, 0.3, -0.2];
        assert!((mean_absolute_error(&e) - 0.2).abs() < 1e-12);
        assert!((root_mean_squared_error(&e) - (0.18f64 / 4.0).sqrt()).abs() < 1e-12);
        assert!((std_dev(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_known() {
        let eq = [1.0, 1.1, 0.9, 0.95];
        assert!((max_drawdown(&eq) - (0.9 - 1.1) / 1.1).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]), 0.0);
    }

    #[test]
    fn total_return_known() {
        assert!((total_return(&[1.0, 1.05, 1.1]) - 0.1).abs() < 1e-12);
        assert_eq!(total_return(&[]), 0.0);
    }
}
