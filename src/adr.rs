//! Average Daily Range and the dynamic brick-size schedule.
//!
//! ADR mode scales brick/reversal sizes per session: each session's ADR is
//! the mean (high - low) of the N prior complete sessions, and the schedule
//! records the OHLC index at which each new ADR value takes effect. The
//! Renko engine consults the schedule lazily (lock-at-start semantics).

use crate::calendar::{session_date, SessionSchedule};
use crate::error::{RenkoError, Result};
use crate::types::{round6, OhlcBar};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One piecewise-constant segment of the size schedule: from `source_index`
/// on, bricks are `brick_size` high and reversals need `reversal_size`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeScheduleEntry {
    pub source_index: usize,
    pub brick_size: f64,
    pub reversal_size: f64,
    pub adr_value: Option<f64>,
}

/// Fixed-size schedule for price mode: a single entry covering the whole scan.
pub fn price_schedule(brick_size: f64, reversal_size: f64) -> Vec<SizeScheduleEntry> {
    vec![SizeScheduleEntry {
        source_index: 0,
        brick_size,
        reversal_size,
        adr_value: None,
    }]
}

/// The schedule entry governing OHLC index `index`: the entry with the
/// greatest `source_index <= index`, or the first entry before any applies.
pub fn schedule_at(schedule: &[SizeScheduleEntry], index: usize) -> &SizeScheduleEntry {
    let pos = schedule.partition_point(|e| e.source_index <= index);
    if pos == 0 {
        &schedule[0]
    } else {
        &schedule[pos - 1]
    }
}

/// Compute the per-session ADR lookup from raw OHLC data.
///
/// Sessions with fewer than `adr_period` complete prior sessions have no ADR
/// and are absent from the map.
pub fn compute_adr_lookup(
    bars: &[OhlcBar],
    adr_period: usize,
    schedule: &SessionSchedule,
) -> BTreeMap<NaiveDate, f64> {
    // Daily extremes, keyed (and therefore ordered) by session date
    let mut daily: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for bar in bars {
        let date = session_date(bar.timestamp, schedule);
        let entry = daily.entry(date).or_insert((bar.high, bar.low));
        entry.0 = entry.0.max(bar.high);
        entry.1 = entry.1.min(bar.low);
    }

    let ranges: Vec<(NaiveDate, f64)> = daily
        .into_iter()
        .map(|(date, (high, low))| (date, high - low))
        .collect();

    let mut lookup = BTreeMap::new();
    for i in adr_period..ranges.len() {
        let window = &ranges[i - adr_period..i];
        let mean = window.iter().map(|(_, r)| r).sum::<f64>() / adr_period as f64;
        lookup.insert(ranges[i].0, mean);
    }
    lookup
}

/// Build the ADR-mode size schedule by walking the OHLC index range and
/// emitting an entry whenever the session ADR changes.
///
/// `brick_pct` / `reversal_pct` are percentages of ADR. Fails with
/// `InsufficientHistory` when no bar falls in a session with a defined ADR.
pub fn build_size_schedule(
    bars: &[OhlcBar],
    schedule: &SessionSchedule,
    adr_period: usize,
    brick_pct: f64,
    reversal_pct: f64,
) -> Result<Vec<SizeScheduleEntry>> {
    let adr_lookup = compute_adr_lookup(bars, adr_period, schedule);

    let mut entries = Vec::new();
    let mut prev_adr: Option<f64> = None;
    for (i, bar) in bars.iter().enumerate() {
        let date = session_date(bar.timestamp, schedule);
        if let Some(&adr) = adr_lookup.get(&date) {
            if prev_adr != Some(adr) {
                entries.push(SizeScheduleEntry {
                    source_index: i,
                    brick_size: round6(adr * brick_pct / 100.0),
                    reversal_size: round6(adr * reversal_pct / 100.0),
                    adr_value: Some(round6(adr)),
                });
                prev_adr = Some(adr);
            }
        }
    }

    if entries.is_empty() {
        return Err(RenkoError::InsufficientHistory { adr_period });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, TimeZone, Utc, Weekday};

    /// One bar per hour, `sessions` weekday sessions starting Mon 2024-01-01,
    /// with a per-session range of `base + k * step`.
    fn session_bars(sessions: usize, base: f64, step: f64) -> Vec<OhlcBar> {
        let mut bars = Vec::new();
        let mut day = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for k in 0..sessions {
            // Skip weekends so every day is its own session
            while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                day = day + Duration::days(1);
            }
            let range = base + k as f64 * step;
            for h in 0..8 {
                let ts = day + Duration::hours(h);
                bars.push(OhlcBar {
                    timestamp: ts,
                    open: 1.0,
                    high: 1.0 + range,
                    low: 1.0,
                    close: 1.0 + range / 2.0,
                    volume: 0.0,
                });
            }
            day = day + Duration::days(1);
        }
        bars
    }

    #[test]
    fn test_adr_undefined_for_first_sessions() {
        let bars = session_bars(5, 0.01, 0.0);
        let lookup = compute_adr_lookup(&bars, 3, &SessionSchedule::default());
        // Sessions 0..3 have no ADR, sessions 3 and 4 do
        assert_eq!(lookup.len(), 2);
        for adr in lookup.values() {
            assert!((adr - 0.01).abs() < 1e-12);
        }
    }

    #[test]
    fn test_adr_is_trailing_mean() {
        let bars = session_bars(4, 0.01, 0.01); // ranges 0.01, 0.02, 0.03, 0.04
        let lookup = compute_adr_lookup(&bars, 3, &SessionSchedule::default());
        let adr = *lookup.values().next().unwrap();
        assert!((adr - 0.02).abs() < 1e-12); // mean of first three ranges
    }

    #[test]
    fn test_schedule_emits_on_adr_change() {
        let bars = session_bars(6, 0.01, 0.01);
        let sched =
            build_size_schedule(&bars, &SessionSchedule::default(), 3, 10.0, 20.0).unwrap();
        // ADR defined for sessions 3, 4, 5 and changes each session
        assert_eq!(sched.len(), 3);
        assert!(sched.windows(2).all(|w| w[0].source_index < w[1].source_index));
        let first = &sched[0];
        assert!((first.brick_size - round6(0.02 * 0.10)).abs() < 1e-12);
        assert!((first.reversal_size - round6(0.02 * 0.20)).abs() < 1e-12);
        assert_eq!(first.adr_value, Some(0.02));
    }

    #[test]
    fn test_insufficient_history() {
        let bars = session_bars(2, 0.01, 0.0);
        let err = build_size_schedule(&bars, &SessionSchedule::default(), 14, 10.0, 20.0)
            .unwrap_err();
        assert!(matches!(err, RenkoError::InsufficientHistory { adr_period: 14 }));
    }

    #[test]
    fn test_schedule_lookup() {
        let entries = vec![
            SizeScheduleEntry {
                source_index: 5,
                brick_size: 0.001,
                reversal_size: 0.002,
                adr_value: Some(0.01),
            },
            SizeScheduleEntry {
                source_index: 20,
                brick_size: 0.002,
                reversal_size: 0.004,
                adr_value: Some(0.02),
            },
        ];
        // Before the first entry, the first entry still applies
        assert_eq!(schedule_at(&entries, 0).source_index, 5);
        assert_eq!(schedule_at(&entries, 5).source_index, 5);
        assert_eq!(schedule_at(&entries, 19).source_index, 5);
        assert_eq!(schedule_at(&entries, 20).source_index, 20);
        assert_eq!(schedule_at(&entries, 100).source_index, 20);
    }
}
