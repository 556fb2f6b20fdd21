use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One bar of source OHLC data (M1 or aggregated tick).
///
/// Timestamps are UTC and must arrive monotonically non-decreasing with
/// duplicates already dropped upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Cooperative cancellation flag, checked at brick-batch boundaries and
/// between analytics columns. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Round to 5 decimal places (price precision).
pub fn round5(v: f64) -> f64 {
    (v * 1e5).round() / 1e5
}

/// Round to 2 decimal places (normalized metrics, durations).
pub fn round2(v: f64) -> f64 {
    (v * 1e2).round() / 1e2
}

/// Round to 6 decimal places (ADR-derived sizes).
pub fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round5(1.000004999), 1.0);
        assert_eq!(round5(0.123456), 0.12346);
        assert_eq!(round2(1.006), 1.01);
        assert_eq!(round6(0.0123456789), 0.012346);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
