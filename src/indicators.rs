//! Moving-average and session-anchored indicators over brick closes.
//!
//! Warmup positions (fewer than `period` samples) are `None`; the analytics
//! trim drops them from the final table.

use chrono::NaiveDate;

/// Exponential moving average seeded with the SMA of the first `period`
/// values: `EMA[i] = (v[i] - EMA[i-1]) * 2/(period+1) + EMA[i-1]`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..n {
        let next = (values[i] - prev) * multiplier + prev;
        out[i] = Some(next);
        prev = next;
    }
    out
}

/// Simple moving average over a full window; `None` until the window fills.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..n {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// SMA envelope: center plus bands at +/- `deviation` percent.
pub struct SmaEnvelope {
    pub center: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub fn sma_envelope(values: &[f64], period: usize, deviation: f64) -> SmaEnvelope {
    let center = sma(values, period);
    let upper = center
        .iter()
        .map(|c| c.map(|v| v * (1.0 + deviation / 100.0)))
        .collect();
    let lower = center
        .iter()
        .map(|c| c.map(|v| v * (1.0 - deviation / 100.0)))
        .collect();
    SmaEnvelope { center, upper, lower }
}

/// Running mean and population standard deviation of `values`, restarting at
/// every session boundary. Welford's algorithm keeps it O(1) per bar.
pub struct SessionStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

pub fn session_anchored_stats(values: &[f64], session_dates: &[NaiveDate]) -> SessionStats {
    let n = values.len();
    let mut mean = vec![0.0; n];
    let mut std = vec![0.0; n];

    let mut count = 0usize;
    let mut running_mean = 0.0;
    let mut m2 = 0.0;
    let mut current_session: Option<NaiveDate> = None;

    for i in 0..n {
        if current_session != Some(session_dates[i]) {
            current_session = Some(session_dates[i]);
            count = 0;
            running_mean = 0.0;
            m2 = 0.0;
        }

        count += 1;
        let delta = values[i] - running_mean;
        running_mean += delta / count as f64;
        m2 += delta * (values[i] - running_mean);

        mean[i] = running_mean;
        std[i] = if count < 2 {
            0.0
        } else {
            (m2 / count as f64).sqrt()
        };
    }

    SessionStats { mean, std }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_warmup_and_seed() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&values, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        // Seed is the SMA of the first three values
        assert_eq!(out[2], Some(2.0));
        // multiplier = 0.5: (4 - 2) * 0.5 + 2 = 3
        assert_eq!(out[3], Some(3.0));
        assert_eq!(out[4], Some(4.0));
    }

    #[test]
    fn test_ema_short_series() {
        let out = ema(&[1.0, 2.0], 5);
        assert!(out.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_sma_window() {
        let values = [2.0, 4.0, 6.0, 8.0];
        let out = sma(&values, 2);
        assert_eq!(out, vec![None, Some(3.0), Some(5.0), Some(7.0)]);
    }

    #[test]
    fn test_sma_envelope_bands() {
        let env = sma_envelope(&[100.0, 100.0], 2, 1.0);
        assert_eq!(env.center[1], Some(100.0));
        assert_eq!(env.upper[1], Some(101.0));
        assert_eq!(env.lower[1], Some(99.0));
    }

    #[test]
    fn test_session_stats_match_direct_computation() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let values = [1.0, 2.0, 3.0, 4.0];
        let dates = [date; 4];
        let stats = session_anchored_stats(&values, &dates);

        assert!((stats.mean[3] - 2.5).abs() < 1e-12);
        // Population std of [1,2,3,4]
        let expected = (1.25f64).sqrt();
        assert!((stats.std[3] - expected).abs() < 1e-12);
        // Single sample has zero std
        assert_eq!(stats.std[0], 0.0);
    }

    #[test]
    fn test_session_stats_reset_at_boundary() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
        let values = [10.0, 20.0, 100.0, 200.0];
        let dates = [d1, d1, d2, d2];
        let stats = session_anchored_stats(&values, &dates);

        assert!((stats.mean[1] - 15.0).abs() < 1e-12);
        // New session starts fresh
        assert!((stats.mean[2] - 100.0).abs() < 1e-12);
        assert_eq!(stats.std[2], 0.0);
        assert!((stats.mean[3] - 150.0).abs() < 1e-12);
    }
}
