//! Renko brick engine.
//!
//! Single-pass state machine converting an OHLC stream into a sequence of
//! fixed-height bricks:
//! 1. UNDETERMINED - no brick yet; the first threshold crossed sets the trend
//! 2. UP - continuation bricks every `brick_size` above the last close,
//!    reversal when price drops `reversal_size` below it
//! 3. DOWN - symmetric
//!
//! Brick and reversal sizes follow a piecewise-constant schedule with
//! lock-at-start semantics: the schedule is consulted every bar into a
//! `pending` triple, but thresholds only adopt it after a brick completes,
//! so a size change never moves the goalposts of the brick already forming.

use crate::adr::{schedule_at, SizeScheduleEntry};
use crate::error::{RenkoError, Result};
use crate::types::{round5, CancelToken, OhlcBar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard cap on the number of bricks a scan may produce.
const MAX_ESTIMATED_BRICKS: f64 = 100_000.0;

/// Wick rendering policy for completed bricks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WickMode {
    /// Show any retracement beyond the brick body.
    #[default]
    All,
    /// Only show wicks longer than one brick.
    Big,
    /// No wicks; bricks are flat boxes.
    None,
}

impl std::fmt::Display for WickMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WickMode::All => write!(f, "all"),
            WickMode::Big => write!(f, "big"),
            WickMode::None => write!(f, "none"),
        }
    }
}

/// A completed Renko brick.
///
/// `close = open + direction * brick_size` exactly (modulo the 5-decimal
/// output rounding). UP bricks have `high = close`; DOWN bricks have
/// `low = close`. The source span `[source_index_open, source_index_close]`
/// covers the OHLC bars that formed the brick; consecutive bricks share at
/// most the boundary index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brick {
    pub timestamp_open: DateTime<Utc>,
    pub timestamp_close: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// +1 for UP, -1 for DOWN.
    pub direction: i8,
    /// Set only on the first brick of a direction-changing batch.
    pub is_reversal: bool,
    pub source_index_open: usize,
    pub source_index_close: usize,
    pub brick_size: f64,
    pub reversal_size: f64,
    pub adr_value: Option<f64>,
}

/// The still-forming brick after the last input bar: price has moved off the
/// last completed close but has not crossed a threshold yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingBrick {
    pub timestamp_open: DateTime<Utc>,
    pub timestamp_close: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub direction: i8,
    pub source_index_open: usize,
    pub source_index_close: usize,
    pub brick_size: f64,
    pub reversal_size: f64,
    pub adr_value: Option<f64>,
}

/// Result of a Renko scan: the completed bricks plus the trailing
/// not-yet-confirmed brick, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenkoOutput {
    pub bricks: Vec<Brick>,
    pub pending: Option<PendingBrick>,
}

/// Active (threshold-governing) size triple.
#[derive(Debug, Clone, Copy)]
struct Sizes {
    brick: f64,
    reversal: f64,
    adr: Option<f64>,
}

impl From<&SizeScheduleEntry> for Sizes {
    fn from(e: &SizeScheduleEntry) -> Self {
        Self {
            brick: e.brick_size,
            reversal: e.reversal_size,
            adr: e.adr_value,
        }
    }
}

/// Generate Renko bricks from OHLC bars under a size schedule.
///
/// Fewer than 2 input bars yields an empty output (not an error). The
/// schedule must be non-empty and its brick sizes positive and finite.
pub fn generate_renko(
    bars: &[OhlcBar],
    schedule: &[SizeScheduleEntry],
    wick_mode: WickMode,
    cancel: &CancelToken,
) -> Result<RenkoOutput> {
    if schedule.is_empty() {
        return Err(RenkoError::InvalidConfig("empty size schedule".to_string()));
    }
    for entry in schedule {
        if !entry.brick_size.is_finite() || entry.brick_size <= 0.0 {
            return Err(RenkoError::InvalidBrickSize(entry.brick_size));
        }
    }

    if bars.len() < 2 {
        return Ok(RenkoOutput::default());
    }

    // Reject sizes that would explode the brick count
    let first_brick = schedule[0].brick_size;
    let (min_close, max_close) = bars.iter().fold((f64::MAX, f64::MIN), |(lo, hi), b| {
        (lo.min(b.close), hi.max(b.close))
    });
    let estimated = (max_close - min_close) / first_brick;
    if estimated > MAX_ESTIMATED_BRICKS {
        return Err(RenkoError::BrickSizeTooSmall {
            brick_size: first_brick,
            estimated_bricks: estimated as u64,
        });
    }

    let mut active = Sizes::from(schedule_at(schedule, 0));
    let mut pending_sizes = active;

    // Anchor the grid on the first open, snapped down to a brick boundary
    let ref_price = (bars[0].open / active.brick).floor() * active.brick;

    let mut last_close = ref_price;
    let mut direction: i8 = 0;
    let mut up_threshold = ref_price + active.brick;
    let mut down_threshold = ref_price - active.brick;
    let mut span_high = bars[0].high;
    let mut span_low = bars[0].low;
    let mut span_start: usize = 0;

    let mut bricks: Vec<Brick> = Vec::new();

    for i in 0..bars.len() {
        if cancel.is_cancelled() {
            return Err(RenkoError::Cancelled);
        }

        pending_sizes = Sizes::from(schedule_at(schedule, i));
        span_high = span_high.max(bars[i].high);
        span_low = span_low.min(bars[i].low);
        let price = bars[i].close;

        if direction == 0 {
            if price >= up_threshold {
                let close = last_close + active.brick;
                bricks.push(make_brick(
                    bars,
                    span_start,
                    i,
                    last_close,
                    close,
                    1,
                    false,
                    up_brick_low(wick_mode, span_low, last_close, active.brick, true),
                    &active,
                ));
                last_close = close;
                direction = 1;
                active = pending_sizes;
                up_threshold = last_close + active.brick;
                down_threshold = last_close - active.reversal;
                span_high = bars[i].high;
                span_low = bars[i].low;
                span_start = i;
            } else if price <= down_threshold {
                let close = last_close - active.brick;
                bricks.push(make_brick(
                    bars,
                    span_start,
                    i,
                    last_close,
                    close,
                    -1,
                    false,
                    down_brick_high(wick_mode, span_high, last_close, active.brick, true),
                    &active,
                ));
                last_close = close;
                direction = -1;
                active = pending_sizes;
                down_threshold = last_close - active.brick;
                up_threshold = last_close + active.reversal;
                span_high = bars[i].high;
                span_low = bars[i].low;
                span_start = i;
            }
        } else if direction == 1 {
            if price >= up_threshold {
                // Continuation: one brick per threshold crossed within the span
                let crossings =
                    threshold_crossings(bars, span_start, i, up_threshold, active.brick, 1);
                for (idx, &(co, cc)) in crossings.iter().enumerate() {
                    let close = last_close + active.brick;
                    let low = up_brick_low(wick_mode, span_low, last_close, active.brick, idx == 0);
                    bricks.push(make_brick(bars, co, cc, last_close, close, 1, false, low, &active));
                    last_close = close;
                }
                active = pending_sizes;
                up_threshold = last_close + active.brick;
                down_threshold = last_close - active.reversal;
                span_high = bars[i].high;
                // A multi-brick batch pins the carryover low at the final
                // close so a later reversal cannot claim a pre-batch low
                span_low = if crossings.len() > 1 { last_close } else { bars[i].low };
                span_start = i;
            } else if price <= down_threshold {
                // Reversal: scan from the first-brick threshold so multi-brick
                // batches get correct first-crossing indices
                let first_threshold = last_close - active.brick;
                let crossings =
                    threshold_crossings(bars, span_start, i, first_threshold, active.brick, -1);
                for (idx, &(co, cc)) in crossings.iter().enumerate() {
                    let close = last_close - active.brick;
                    let high = if idx == 1 {
                        second_brick_high(bars, co, cc, wick_mode, last_close, active.brick)
                    } else {
                        down_brick_high(wick_mode, span_high, last_close, active.brick, idx == 0)
                    };
                    bricks.push(make_brick(
                        bars, co, cc, last_close, close, -1, idx == 0, high, &active,
                    ));
                    last_close = close;
                }
                direction = -1;
                active = pending_sizes;
                down_threshold = last_close - active.brick;
                up_threshold = last_close + active.reversal;
                span_high = if crossings.len() > 1 { last_close } else { bars[i].high };
                span_low = bars[i].low;
                span_start = i;
            }
        } else {
            if price <= down_threshold {
                let crossings =
                    threshold_crossings(bars, span_start, i, down_threshold, active.brick, -1);
                for (idx, &(co, cc)) in crossings.iter().enumerate() {
                    let close = last_close - active.brick;
                    let high =
                        down_brick_high(wick_mode, span_high, last_close, active.brick, idx == 0);
                    bricks.push(make_brick(
                        bars, co, cc, last_close, close, -1, false, high, &active,
                    ));
                    last_close = close;
                }
                active = pending_sizes;
                down_threshold = last_close - active.brick;
                up_threshold = last_close + active.reversal;
                span_high = if crossings.len() > 1 { last_close } else { bars[i].high };
                span_low = bars[i].low;
                span_start = i;
            } else if price >= up_threshold {
                let first_threshold = last_close + active.brick;
                let crossings =
                    threshold_crossings(bars, span_start, i, first_threshold, active.brick, 1);
                for (idx, &(co, cc)) in crossings.iter().enumerate() {
                    let close = last_close + active.brick;
                    let low = if idx == 1 {
                        second_brick_low(bars, co, cc, wick_mode, last_close, active.brick)
                    } else {
                        up_brick_low(wick_mode, span_low, last_close, active.brick, idx == 0)
                    };
                    bricks.push(make_brick(
                        bars, co, cc, last_close, close, 1, idx == 0, low, &active,
                    ));
                    last_close = close;
                }
                direction = 1;
                active = pending_sizes;
                up_threshold = last_close + active.brick;
                down_threshold = last_close - active.reversal;
                span_high = bars[i].high;
                span_low = if crossings.len() > 1 { last_close } else { bars[i].low };
                span_start = i;
            }
        }
    }

    // The forming brick that has not crossed a threshold yet
    let pending = if direction != 0 {
        let last_idx = bars.len() - 1;
        let price = bars[last_idx].close;
        let (high, low) = if direction == 1 {
            (
                round5(price.max(last_close)),
                round5(up_brick_low(wick_mode, span_low, last_close, active.brick, true)),
            )
        } else {
            (
                round5(down_brick_high(wick_mode, span_high, last_close, active.brick, true)),
                round5(price.min(last_close)),
            )
        };
        Some(PendingBrick {
            timestamp_open: bars[span_start].timestamp,
            timestamp_close: bars[last_idx].timestamp,
            open: round5(last_close),
            high,
            low,
            close: round5(price),
            direction,
            source_index_open: span_start,
            source_index_close: last_idx,
            brick_size: active.brick,
            reversal_size: active.reversal,
            adr_value: active.adr,
        })
    } else {
        None
    };

    Ok(RenkoOutput { bricks, pending })
}

#[allow(clippy::too_many_arguments)]
fn make_brick(
    bars: &[OhlcBar],
    source_open: usize,
    source_close: usize,
    open: f64,
    close: f64,
    direction: i8,
    is_reversal: bool,
    wick: f64,
    sizes: &Sizes,
) -> Brick {
    let (high, low) = if direction == 1 {
        (close, wick)
    } else {
        (wick, close)
    };
    Brick {
        timestamp_open: bars[source_open].timestamp,
        timestamp_close: bars[source_close].timestamp,
        open: round5(open),
        high: round5(high),
        low: round5(low),
        close: round5(close),
        direction,
        is_reversal,
        source_index_open: source_open,
        source_index_close: source_close,
        brick_size: sizes.brick,
        reversal_size: sizes.reversal,
        adr_value: sizes.adr,
    }
}

/// Find the (source_open, source_close) index pair for every brick threshold
/// crossed by the closes in `[start, end]`.
///
/// A bar that jumps k thresholds yields k pairs; after the first, both
/// indices collapse onto the crossing bar.
fn threshold_crossings(
    bars: &[OhlcBar],
    start: usize,
    end: usize,
    start_threshold: f64,
    brick: f64,
    direction: i8,
) -> Vec<(usize, usize)> {
    let mut crossings = Vec::new();
    let mut threshold = start_threshold;
    let mut open_idx = start;

    for (j, bar) in bars.iter().enumerate().take(end + 1).skip(start) {
        let price = bar.close;
        if direction == 1 {
            while price >= threshold {
                crossings.push((open_idx, j));
                open_idx = j;
                threshold += brick;
            }
        } else {
            while price <= threshold {
                crossings.push((open_idx, j));
                open_idx = j;
                threshold -= brick;
            }
        }
    }
    crossings
}

/// Low of an UP brick under the wick policy. `apply_wick` is false for every
/// batch brick after the first, which renders flat.
fn up_brick_low(mode: WickMode, span_low: f64, brick_open: f64, brick: f64, apply_wick: bool) -> f64 {
    if !apply_wick {
        return brick_open;
    }
    match mode {
        WickMode::None => brick_open,
        WickMode::All => span_low.min(brick_open),
        WickMode::Big => {
            let retracement = round5(brick_open - span_low);
            if retracement > brick {
                span_low
            } else {
                brick_open
            }
        }
    }
}

/// High of a DOWN brick under the wick policy.
fn down_brick_high(
    mode: WickMode,
    span_high: f64,
    brick_open: f64,
    brick: f64,
    apply_wick: bool,
) -> f64 {
    if !apply_wick {
        return brick_open;
    }
    match mode {
        WickMode::None => brick_open,
        WickMode::All => span_high.max(brick_open),
        WickMode::Big => {
            let retracement = round5(span_high - brick_open);
            if retracement > brick {
                span_high
            } else {
                brick_open
            }
        }
    }
}

/// The second brick of an UP reversal batch takes its wick from the raw OHLC
/// range over its own source window instead of the batch carryover.
fn second_brick_low(
    bars: &[OhlcBar],
    source_open: usize,
    source_close: usize,
    mode: WickMode,
    brick_open: f64,
    brick: f64,
) -> f64 {
    let range_low = bars[source_open..=source_close]
        .iter()
        .fold(f64::MAX, |lo, b| lo.min(b.low));
    match mode {
        WickMode::None => brick_open,
        WickMode::All => range_low.min(brick_open),
        WickMode::Big => {
            let retracement = round5(brick_open - range_low);
            if retracement > brick {
                range_low
            } else {
                brick_open
            }
        }
    }
}

/// DOWN-reversal counterpart of [`second_brick_low`].
fn second_brick_high(
    bars: &[OhlcBar],
    source_open: usize,
    source_close: usize,
    mode: WickMode,
    brick_open: f64,
    brick: f64,
) -> f64 {
    let range_high = bars[source_open..=source_close]
        .iter()
        .fold(f64::MIN, |hi, b| hi.max(b.high));
    match mode {
        WickMode::None => brick_open,
        WickMode::All => range_high.max(brick_open),
        WickMode::Big => {
            let retracement = round5(range_high - brick_open);
            if retracement > brick {
                range_high
            } else {
                brick_open
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adr::price_schedule;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(rows: &[(f64, f64, f64, f64)]) -> Vec<OhlcBar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| OhlcBar {
                timestamp: t0 + Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                volume: 0.0,
            })
            .collect()
    }

    fn run(rows: &[(f64, f64, f64, f64)], wick_mode: WickMode) -> RenkoOutput {
        let bars = bars_from(rows);
        let schedule = price_schedule(0.0010, 0.0020);
        generate_renko(&bars, &schedule, wick_mode, &CancelToken::new()).unwrap()
    }

    #[test]
    fn test_single_up_brick() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9998, 1.0003),
                (1.0003, 1.0015, 1.0002, 1.0012),
            ],
            WickMode::All,
        );
        assert_eq!(out.bricks.len(), 1);
        let b = &out.bricks[0];
        assert_eq!(b.open, 1.0000);
        assert_eq!(b.close, 1.0010);
        assert_eq!(b.high, 1.0010);
        assert_eq!(b.low, 0.9998);
        assert_eq!(b.direction, 1);
        assert!(!b.is_reversal);
        assert_eq!(b.source_index_open, 0);
        assert_eq!(b.source_index_close, 1);
    }

    #[test]
    fn test_continuation_batch() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9998, 1.0003),
                (1.0003, 1.0015, 1.0002, 1.0012),
                (1.0012, 1.0032, 1.0011, 1.0031),
            ],
            WickMode::All,
        );
        assert_eq!(out.bricks.len(), 3);
        let b1 = &out.bricks[1];
        let b2 = &out.bricks[2];
        assert_eq!((b1.open, b1.close), (1.0010, 1.0020));
        assert_eq!((b2.open, b2.close), (1.0020, 1.0030));
        // Intra-batch bricks render flat; the batch's first brick carries the
        // span retracement (low of bar 1)
        assert_eq!(b1.low, 1.0002);
        assert_eq!(b2.low, b2.open);
        assert!(!b1.is_reversal && !b2.is_reversal);
    }

    #[test]
    fn test_reversal_batch_flags_first_brick_only() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9998, 1.0003),
                (1.0003, 1.0015, 1.0002, 1.0012),
                (1.0012, 1.0013, 0.9986, 0.9988),
            ],
            WickMode::All,
        );
        assert_eq!(out.bricks.len(), 3);
        let first = &out.bricks[1];
        let second = &out.bricks[2];
        assert_eq!((first.open, first.close), (1.0010, 1.0000));
        assert!(first.is_reversal);
        assert_eq!(first.direction, -1);
        assert_eq!((second.open, second.close), (1.0000, 0.9990));
        assert!(!second.is_reversal);
    }

    #[test]
    fn test_big_wick_suppresses_small_retracement() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.99995, 1.0003),
                (1.0003, 1.0015, 1.0001, 1.0012),
            ],
            WickMode::Big,
        );
        assert_eq!(out.bricks.len(), 1);
        // Retracement 0.00005 < brick_size, so no wick
        assert_eq!(out.bricks[0].low, 1.0000);
    }

    #[test]
    fn test_big_wick_keeps_large_retracement() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9985, 1.0003),
                (1.0003, 1.0015, 1.0001, 1.0012),
            ],
            WickMode::Big,
        );
        assert_eq!(out.bricks.len(), 1);
        // Retracement 0.0015 > brick_size 0.0010, wick shows
        assert_eq!(out.bricks[0].low, 0.9985);
    }

    #[test]
    fn test_wick_mode_none_is_flat() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9985, 1.0003),
                (1.0003, 1.0015, 1.0001, 1.0012),
            ],
            WickMode::None,
        );
        assert_eq!(out.bricks[0].low, out.bricks[0].open);
    }

    #[test]
    fn test_no_crossing_yields_no_bricks_and_no_pending() {
        let out = run(
            &[
                (1.0000, 1.0004, 0.9997, 1.0003),
                (1.0003, 1.0006, 1.0001, 1.0005),
            ],
            WickMode::All,
        );
        assert!(out.bricks.is_empty());
        assert!(out.pending.is_none());
    }

    #[test]
    fn test_single_bar_input_is_empty() {
        let out = run(&[(1.0000, 1.0005, 0.9998, 1.0003)], WickMode::All);
        assert!(out.bricks.is_empty());
        assert!(out.pending.is_none());
    }

    #[test]
    fn test_crossing_at_exact_threshold() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9998, 1.0003),
                (1.0003, 1.0010, 1.0002, 1.0010),
            ],
            WickMode::All,
        );
        // close == up_threshold counts as a crossing
        assert_eq!(out.bricks.len(), 1);
    }

    #[test]
    fn test_pending_brick_after_partial_move() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9998, 1.0003),
                (1.0003, 1.0015, 1.0002, 1.0012),
                (1.0012, 1.0018, 1.0011, 1.0016),
            ],
            WickMode::All,
        );
        assert_eq!(out.bricks.len(), 1);
        let pending = out.pending.expect("pending brick");
        assert_eq!(pending.open, 1.0010);
        assert_eq!(pending.close, 1.0016);
        assert_eq!(pending.direction, 1);
        assert_eq!(pending.source_index_close, 2);
    }

    #[test]
    fn test_invalid_brick_size() {
        let bars = bars_from(&[(1.0, 1.1, 0.9, 1.05), (1.05, 1.2, 1.0, 1.15)]);
        let schedule = price_schedule(0.0, 0.0);
        let err =
            generate_renko(&bars, &schedule, WickMode::All, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RenkoError::InvalidBrickSize(_)));
    }

    #[test]
    fn test_brick_size_too_small() {
        let bars = bars_from(&[(1.0, 2.0, 0.5, 1.0), (1.0, 3.0, 1.0, 3.0)]);
        let schedule = price_schedule(0.0000001, 0.0000002);
        let err =
            generate_renko(&bars, &schedule, WickMode::All, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RenkoError::BrickSizeTooSmall { .. }));
    }

    #[test]
    fn test_multi_threshold_jump_collapses_source_span() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9998, 1.0003),
                (1.0003, 1.0041, 1.0002, 1.0040),
            ],
            WickMode::All,
        );
        // One bar jumps four thresholds: 1.0010, 1.0020, 1.0030, 1.0040.
        // Direction was undetermined, so only the first brick is emitted at
        // the crossing; the rest follow on the next scan step... but with a
        // single remaining bar there is none, so we get 1 brick + pending.
        assert_eq!(out.bricks.len(), 1);
        assert_eq!(out.bricks[0].close, 1.0010);
        let pending = out.pending.expect("pending");
        assert_eq!(pending.close, 1.0040);
    }

    #[test]
    fn test_continuation_multi_brick_single_bar() {
        let out = run(
            &[
                (1.0000, 1.0005, 0.9998, 1.0003),
                (1.0003, 1.0015, 1.0002, 1.0012),
                (1.0012, 1.0041, 1.0011, 1.0040),
            ],
            WickMode::All,
        );
        // Brick 0 at bar 1, then a 3-brick continuation batch at bar 2
        assert_eq!(out.bricks.len(), 4);
        let closes: Vec<f64> = out.bricks.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0010, 1.0020, 1.0030, 1.0040]);
        // Batch bricks after the first share the crossing bar's index
        assert_eq!(out.bricks[1].source_index_close, 2);
        assert_eq!(out.bricks[2].source_index_open, 2);
        assert_eq!(out.bricks[2].source_index_close, 2);
    }

    #[test]
    fn test_pending_vs_active_size_adoption() {
        let bars = bars_from(&[
            (1.0000, 1.0005, 0.9998, 1.0003),
            (1.0003, 1.0007, 1.0001, 1.0005),
            (1.0005, 1.0015, 1.0004, 1.0012),
            (1.0012, 1.0020, 1.0011, 1.0019),
        ]);
        // ADR drops at index 2: new brick size 0.0008
        let schedule = vec![
            SizeScheduleEntry {
                source_index: 0,
                brick_size: 0.0010,
                reversal_size: 0.0020,
                adr_value: Some(0.0100),
            },
            SizeScheduleEntry {
                source_index: 2,
                brick_size: 0.0008,
                reversal_size: 0.0016,
                adr_value: Some(0.0080),
            },
        ];
        let out = generate_renko(&bars, &schedule, WickMode::All, &CancelToken::new()).unwrap();
        assert_eq!(out.bricks.len(), 2);
        // The brick forming across the change completes at the old size
        assert_eq!(out.bricks[0].brick_size, 0.0010);
        assert_eq!(out.bricks[0].close, 1.0010);
        // The next brick adopts the new size: threshold 1.0010 + 0.0008
        assert_eq!(out.bricks[1].brick_size, 0.0008);
        assert_eq!(out.bricks[1].close, 1.0018);
    }

    #[test]
    fn test_determinism() {
        let rows = [
            (1.0000, 1.0012, 0.9990, 1.0011),
            (1.0011, 1.0025, 1.0002, 1.0022),
            (1.0022, 1.0030, 0.9985, 0.9991),
            (0.9991, 1.0015, 0.9980, 1.0013),
            (1.0013, 1.0045, 1.0010, 1.0042),
        ];
        let a = run(&rows, WickMode::All);
        let b = run(&rows, WickMode::All);
        assert_eq!(a.bricks, b.bricks);
        assert_eq!(a.pending, b.pending);
    }

    #[test]
    fn test_brick_invariants_random_walkish() {
        // A hand-rolled walk with several reversals
        let rows = [
            (1.0000, 1.0012, 0.9990, 1.0011),
            (1.0011, 1.0025, 1.0002, 1.0022),
            (1.0022, 1.0030, 0.9985, 0.9989),
            (0.9989, 1.0015, 0.9975, 0.9978),
            (0.9978, 1.0040, 0.9970, 1.0035),
            (1.0035, 1.0060, 1.0030, 1.0055),
        ];
        let out = run(&rows, WickMode::All);
        assert!(!out.bricks.is_empty());
        let mut prev_source_open = 0;
        let mut prev_direction = 0i8;
        for b in &out.bricks {
            let height = (b.close - b.open) * b.direction as f64;
            assert!((height - b.brick_size).abs() < 1e-9);
            assert!(b.high >= b.open.max(b.close) - 1e-9);
            assert!(b.low <= b.open.min(b.close) + 1e-9);
            assert!(b.source_index_open <= b.source_index_close);
            assert!(b.source_index_open >= prev_source_open);
            if b.is_reversal {
                assert_ne!(b.direction, prev_direction);
            }
            prev_source_open = b.source_index_open;
            prev_direction = b.direction;
        }
    }

    #[test]
    fn test_cancellation() {
        let bars = bars_from(&[(1.0, 1.1, 0.9, 1.05), (1.05, 1.2, 1.0, 1.15)]);
        let schedule = price_schedule(0.01, 0.02);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = generate_renko(&bars, &schedule, WickMode::All, &cancel).unwrap_err();
        assert!(matches!(err, RenkoError::Cancelled));
    }
}
