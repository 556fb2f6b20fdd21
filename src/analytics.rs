//! Derived per-brick analytics: the full feature table.
//!
//! Takes a completed brick sequence plus the raw OHLC it came from (for ADR
//! lookup) and produces every derived column: moving averages and envelopes,
//! session-anchored PWAP bands, distances, the MA-ordering State machine,
//! pullback counters, consecutive-run counters, and the forward-looking
//! excursion metrics. The table is trimmed on both ends so every remaining
//! row has all warmup and forward-scan columns defined.

use crate::adr::compute_adr_lookup;
use crate::calendar::{session_date, SessionSchedule};
use crate::error::{RenkoError, Result};
use crate::indicators::{ema, session_anchored_stats, sma_envelope};
use crate::renko::{Brick, WickMode};
use crate::table::{FeatureTable, TableSettings};
use crate::types::{round2, round5, CancelToken, OhlcBar};
use serde::{Deserialize, Serialize};

/// Analytics pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub adr_period: usize,
    pub ma1_period: usize,
    pub ma2_period: usize,
    pub ma3_period: usize,
    pub chop_period: usize,
    pub smae1_period: usize,
    pub smae1_deviation: f64,
    pub smae2_period: usize,
    pub smae2_deviation: f64,
    pub pwap_sigmas: Vec<f64>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            adr_period: 14,
            ma1_period: 20,
            ma2_period: 50,
            ma3_period: 200,
            chop_period: 20,
            smae1_period: 20,
            smae1_deviation: 1.0,
            smae2_period: 50,
            smae2_deviation: 1.0,
            pwap_sigmas: vec![1.0, 2.0, 2.5, 3.0],
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("adr_period", self.adr_period),
            ("ma1_period", self.ma1_period),
            ("ma2_period", self.ma2_period),
            ("ma3_period", self.ma3_period),
            ("chop_period", self.chop_period),
            ("smae1_period", self.smae1_period),
            ("smae2_period", self.smae2_period),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(RenkoError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.ma1_period == self.ma2_period
            || self.ma1_period == self.ma3_period
            || self.ma2_period == self.ma3_period
        {
            return Err(RenkoError::InvalidConfig(
                "MA periods must be distinct".to_string(),
            ));
        }
        if self.pwap_sigmas.is_empty() {
            return Err(RenkoError::InvalidConfig(
                "pwap_sigmas must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn ma_periods(&self) -> [usize; 3] {
        [self.ma1_period, self.ma2_period, self.ma3_period]
    }
}

/// Divide, propagating undefined denominators.
fn div_opt(num: f64, den: Option<f64>) -> Option<f64> {
    den.map(|d| num / d)
}

/// Compute the full feature table for a brick sequence.
///
/// `raw_bars` is the source OHLC the bricks were generated from; it drives
/// the per-session ADR lookup. The result is trimmed to the closed interval
/// where every warmup column (ADR, EMA distances, SMAE centers) and every
/// forward-scan column (`REAL_MA*_Price`) is defined.
pub fn compute_feature_table(
    bricks: &[Brick],
    raw_bars: &[OhlcBar],
    schedule: &SessionSchedule,
    wick_mode: WickMode,
    config: &AnalyticsConfig,
    cancel: &CancelToken,
) -> Result<FeatureTable> {
    config.validate()?;
    if bricks.is_empty() {
        return Err(RenkoError::EmptyInput("no bricks to analyze".to_string()));
    }

    let n = bricks.len();
    let timestamps: Vec<_> = bricks.iter().map(|b| b.timestamp_open).collect();
    let session_dates: Vec<_> = timestamps
        .iter()
        .map(|ts| session_date(*ts, schedule))
        .collect();

    let open: Vec<f64> = bricks.iter().map(|b| b.open).collect();
    let high: Vec<f64> = bricks.iter().map(|b| b.high).collect();
    let low: Vec<f64> = bricks.iter().map(|b| b.low).collect();
    let close: Vec<f64> = bricks.iter().map(|b| b.close).collect();
    let brick_size: Vec<f64> = bricks.iter().map(|b| b.brick_size).collect();
    let reversal_size: Vec<f64> = bricks.iter().map(|b| b.reversal_size).collect();

    let is_up: Vec<bool> = bricks.iter().map(|b| b.close > b.open).collect();
    let is_dn: Vec<bool> = bricks.iter().map(|b| b.close < b.open).collect();

    let settings = TableSettings {
        adr_period: config.adr_period,
        brick_size: brick_size[0],
        reversal_size: reversal_size[0],
        wick_mode,
        ma1_period: config.ma1_period,
        ma2_period: config.ma2_period,
        ma3_period: config.ma3_period,
        chop_period: config.chop_period,
        smae1_period: config.smae1_period,
        smae1_deviation: config.smae1_deviation,
        smae2_period: config.smae2_period,
        smae2_deviation: config.smae2_deviation,
        pwap_sigmas: config.pwap_sigmas.clone(),
    };

    let mut table = FeatureTable::new(timestamps.clone(), session_dates.clone(), settings);

    // Raw brick OHLC and settings echo (grouped left)
    table.push_dense_column("open", open.clone());
    table.push_dense_column("high", high.clone());
    table.push_dense_column("low", low.clone());
    table.push_dense_column("close", close.clone());
    table.push_const_column("adr_period", config.adr_period as f64);
    table.push_dense_column("brick_size", brick_size.clone());
    table.push_dense_column("reversal_size", reversal_size.clone());
    table.push_const_column("wick_mode", wick_mode as u8 as f64);
    table.push_const_column("ma1_period", config.ma1_period as f64);
    table.push_const_column("ma2_period", config.ma2_period as f64);
    table.push_const_column("ma3_period", config.ma3_period as f64);
    table.push_const_column("chop_period", config.chop_period as f64);
    table.push_const_column("smae1_period", config.smae1_period as f64);
    table.push_const_column("smae1_deviation", config.smae1_deviation);
    table.push_const_column("smae2_period", config.smae2_period as f64);
    table.push_const_column("smae2_deviation", config.smae2_deviation);
    for (si, &sigma) in config.pwap_sigmas.iter().enumerate() {
        table.push_const_column(&format!("pwap_sigma{}", si + 1), sigma);
    }

    // ADR mapped onto bricks through their session date
    let adr_lookup = compute_adr_lookup(raw_bars, config.adr_period, schedule);
    let current_adr: Vec<Option<f64>> = session_dates
        .iter()
        .map(|d| adr_lookup.get(d).map(|&v| round5(v)))
        .collect();
    table.push_column("currentADR", current_adr.clone());

    if cancel.is_cancelled() {
        return Err(RenkoError::Cancelled);
    }

    // EMAs (unrounded values kept for State and forward scans)
    let ma_periods = config.ma_periods();
    let emas: Vec<Vec<Option<f64>>> = ma_periods.iter().map(|&p| ema(&close, p)).collect();
    for (idx, series) in emas.iter().enumerate() {
        table.push_column(
            &format!("EMA{}_Price", idx + 1),
            series.iter().map(|v| v.map(round5)).collect(),
        );
    }

    // SMA envelopes
    for (idx, (period, deviation)) in [
        (config.smae1_period, config.smae1_deviation),
        (config.smae2_period, config.smae2_deviation),
    ]
    .into_iter()
    .enumerate()
    {
        let env = sma_envelope(&close, period, deviation);
        let k = idx + 1;
        table.push_column(
            &format!("SMAE{k}_Center"),
            env.center.iter().map(|v| v.map(round5)).collect(),
        );
        table.push_column(
            &format!("SMAE{k}_Upper"),
            env.upper.iter().map(|v| v.map(round5)).collect(),
        );
        table.push_column(
            &format!("SMAE{k}_Lower"),
            env.lower.iter().map(|v| v.map(round5)).collect(),
        );
    }

    // Session-anchored PWAP bands from the typical price
    let tp: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    let pwap = session_anchored_stats(&tp, &session_dates);
    table.push_dense_column("PWAP_Mean", pwap.mean.iter().map(|&m| round5(m)).collect());
    for (si, &sigma) in config.pwap_sigmas.iter().enumerate() {
        let k = si + 1;
        table.push_dense_column(
            &format!("PWAP_Upper{k}"),
            (0..n).map(|i| round5(pwap.mean[i] + pwap.std[i] * sigma)).collect(),
        );
        table.push_dense_column(
            &format!("PWAP_Lower{k}"),
            (0..n).map(|i| round5(pwap.mean[i] - pwap.std[i] * sigma)).collect(),
        );
    }

    // PWAP distances
    let pwap_distance: Vec<f64> = (0..n).map(|i| round5(close[i] - pwap.mean[i])).collect();
    table.push_dense_column("PWAP_distance", pwap_distance.clone());
    table.push_column(
        "PWAP_distance_ADR",
        (0..n)
            .map(|i| div_opt(pwap_distance[i], current_adr[i]).map(round5))
            .collect(),
    );
    table.push_dense_column(
        "PWAP_distance_RR",
        (0..n).map(|i| round5(pwap_distance[i] / reversal_size[i])).collect(),
    );

    if cancel.is_cancelled() {
        return Err(RenkoError::Cancelled);
    }

    // EMA distance columns, raw and normalized
    for (idx, &period) in ma_periods.iter().enumerate() {
        let series = &emas[idx];
        table.push_column(
            &format!("EMA_rawDistance({period})"),
            (0..n)
                .map(|i| series[i].map(|e| round5(close[i] - e)))
                .collect(),
        );
        table.push_column(
            &format!("EMA_adrDistance({period})"),
            (0..n)
                .map(|i| match (series[i], current_adr[i]) {
                    (Some(e), Some(adr)) => Some(round5((close[i] - e) / adr)),
                    _ => None,
                })
                .collect(),
        );
        table.push_column(
            &format!("EMA_rrDistance({period})"),
            (0..n)
                .map(|i| series[i].map(|e| round5((close[i] - e) / reversal_size[i])))
                .collect(),
        );
    }

    // Wick depth (drawdown against the brick direction)
    let dd: Vec<f64> = (0..n)
        .map(|i| {
            if close[i] > open[i] {
                round5(open[i] - low[i])
            } else {
                round5(high[i] - open[i])
            }
        })
        .collect();
    table.push_dense_column("DD", dd.clone());
    table.push_column(
        "DD_ADR",
        (0..n).map(|i| div_opt(dd[i], current_adr[i]).map(round5)).collect(),
    );
    table.push_dense_column(
        "DD_RR",
        (0..n).map(|i| round5(dd[i] / reversal_size[i])).collect(),
    );

    // State: discrete classification of the three-EMA ordering
    let state: Vec<i32> = (0..n)
        .map(|i| match (emas[0][i], emas[1][i], emas[2][i]) {
            (Some(fast), Some(med), Some(slow)) => classify_state(fast, med, slow),
            _ => 0,
        })
        .collect();
    table.push_dense_column("State", state.iter().map(|&s| s as f64).collect());

    let pr_state: Vec<Option<f64>> = (0..n)
        .map(|i| if i == 0 { None } else { Some(state[i - 1] as f64) })
        .collect();
    table.push_column("prState", pr_state);

    // fromState: the State of the run before the most recent change
    let mut from_state: Vec<Option<f64>> = vec![None; n];
    let mut last_state: Option<i32> = None;
    for i in 1..n {
        if state[i] != state[i - 1] {
            last_state = Some(state[i - 1]);
        }
        from_state[i] = last_state.map(|s| s as f64);
    }
    table.push_column("fromState", from_state);

    if cancel.is_cancelled() {
        return Err(RenkoError::Cancelled);
    }

    // Type1 / Type2 pullback counters
    let ema1 = &emas[0];
    let (type1, type2) = pullback_counters(
        &state,
        &is_up,
        &is_dn,
        &open,
        &high,
        &low,
        &brick_size,
        &reversal_size,
        ema1,
    );
    table.push_dense_column("Type1", type1.iter().map(|&v| v as f64).collect());
    table.push_dense_column("Type2", type2.iter().map(|&v| v as f64).collect());

    // Consecutive bar counters
    let mut con_up = vec![0i64; n];
    let mut con_dn = vec![0i64; n];
    let mut up_count = 0i64;
    let mut dn_count = 0i64;
    for i in 0..n {
        if is_up[i] {
            up_count += 1;
            dn_count = 0;
        } else {
            dn_count += 1;
            up_count = 0;
        }
        con_up[i] = up_count;
        con_dn[i] = dn_count;
    }
    table.push_dense_column("Con_UP_bars", con_up.iter().map(|&v| v as f64).collect());
    table.push_dense_column("Con_DN_bars", con_dn.iter().map(|&v| v as f64).collect());

    table.push_dense_column(
        "direction",
        is_up.iter().map(|&u| if u { 1.0 } else { -1.0 }).collect(),
    );

    // Length of the run that ended at the last direction change
    let mut prior_run = vec![0i64; n];
    let mut last_run_length = 0i64;
    for i in 1..n {
        if is_up[i] != is_up[i - 1] {
            last_run_length = if is_up[i - 1] { con_up[i - 1] } else { con_dn[i - 1] };
        }
        prior_run[i] = last_run_length;
    }
    table.push_dense_column("priorRunCount", prior_run.iter().map(|&v| v as f64).collect());

    // State-scoped consecutive counters: also reset on State change
    let mut con_up_state = vec![0i64; n];
    let mut con_dn_state = vec![0i64; n];
    let mut up_count_state = 0i64;
    let mut dn_count_state = 0i64;
    let mut prev_state: Option<i32> = None;
    for i in 0..n {
        if prev_state.is_some() && prev_state != Some(state[i]) {
            up_count_state = 0;
            dn_count_state = 0;
        }
        if is_up[i] {
            up_count_state += 1;
            dn_count_state = 0;
        } else {
            dn_count_state += 1;
            up_count_state = 0;
        }
        con_up_state[i] = up_count_state;
        con_dn_state[i] = dn_count_state;
        prev_state = Some(state[i]);
    }
    table.push_dense_column(
        "Con_UP_bars(state)",
        con_up_state.iter().map(|&v| v as f64).collect(),
    );
    table.push_dense_column(
        "Con_DN_bars(state)",
        con_dn_state.iter().map(|&v| v as f64).collect(),
    );

    // Minutes between consecutive brick timestamps
    let bar_duration: Vec<Option<f64>> = (0..n)
        .map(|i| {
            if i == 0 {
                None
            } else {
                let millis = (timestamps[i] - timestamps[i - 1]).num_milliseconds() as f64;
                Some(round2(millis / 60_000.0))
            }
        })
        .collect();
    table.push_column("barDuration", bar_duration.clone());

    // Bars and summed duration since the current State regime began
    let mut state_bar_count = vec![0i64; n];
    let mut state_duration = vec![0.0f64; n];
    let mut bar_count = 0i64;
    let mut duration_sum = 0.0;
    let mut prev_state_dur: Option<i32> = None;
    for i in 0..n {
        if prev_state_dur.is_some() && prev_state_dur != Some(state[i]) {
            bar_count = 0;
            duration_sum = 0.0;
        }
        bar_count += 1;
        if let Some(d) = bar_duration[i] {
            duration_sum += d;
        }
        state_bar_count[i] = bar_count;
        state_duration[i] = round2(duration_sum);
        prev_state_dur = Some(state[i]);
    }
    table.push_dense_column(
        "stateBarCount",
        state_bar_count.iter().map(|&v| v as f64).collect(),
    );
    table.push_dense_column("stateDuration", state_duration);

    // Rolling chop index: direction reversals per window
    let reversals: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                0.0
            } else if is_up[i] != is_up[i - 1] {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    let chop_period = config.chop_period;
    let chop: Vec<Option<f64>> = (0..n)
        .map(|i| {
            if i + 1 < chop_period {
                None
            } else {
                let sum: f64 = reversals[i + 1 - chop_period..=i].iter().sum();
                Some(round2(sum / chop_period as f64))
            }
        })
        .collect();
    table.push_column("chop(rolling)", chop);

    if cancel.is_cancelled() {
        return Err(RenkoError::Cancelled);
    }

    // Forward scan: consecutive same-color bars after i and the move they cover
    let mut mfe_clr_bars = vec![0i64; n];
    for i in 0..n {
        let mut count = 0i64;
        for j in i + 1..n {
            if is_up[j] == is_up[i] {
                count += 1;
            } else {
                break;
            }
        }
        mfe_clr_bars[i] = count;
    }
    table.push_dense_column(
        "MFE_clr_Bars",
        mfe_clr_bars.iter().map(|&v| v as f64).collect(),
    );

    let mfe_clr_price: Vec<f64> = (0..n)
        .map(|i| {
            let k = mfe_clr_bars[i] as usize;
            if k > 0 {
                round5((close[i + k] - close[i]).abs())
            } else {
                0.0
            }
        })
        .collect();
    table.push_dense_column("MFE_clr_price", mfe_clr_price.clone());
    table.push_column(
        "MFE_clr_ADR",
        (0..n)
            .map(|i| div_opt(mfe_clr_price[i], current_adr[i]).map(round2))
            .collect(),
    );
    table.push_dense_column(
        "MFE_clr_RR",
        (0..n).map(|i| round2(mfe_clr_price[i] / reversal_size[i])).collect(),
    );
    // REAL variants net out one reversal of stop cost
    table.push_column(
        "REAL_clr_ADR",
        (0..n)
            .map(|i| div_opt(mfe_clr_price[i] - reversal_size[i], current_adr[i]).map(round2))
            .collect(),
    );
    table.push_dense_column(
        "REAL_clr_RR",
        (0..n)
            .map(|i| round2((mfe_clr_price[i] - reversal_size[i]) / reversal_size[i]))
            .collect(),
    );

    // MA-trail exits: first opposite-color close beyond each EMA
    for (idx, series) in emas.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(RenkoError::Cancelled);
        }
        let k = idx + 1;
        let mut prices: Vec<Option<f64>> = vec![None; n];
        for i in 0..n {
            for j in i + 1..n {
                if is_up[j] == is_up[i] {
                    continue;
                }
                let Some(ema_j) = series[j] else { continue };
                if is_up[i] && close[j] < ema_j {
                    prices[i] = Some((close[j] - close[i]).max(-reversal_size[i]));
                    break;
                } else if !is_up[i] && close[j] > ema_j {
                    prices[i] = Some((close[i] - close[j]).max(-reversal_size[i]));
                    break;
                }
            }
        }
        table.push_column(
            &format!("REAL_MA{k}_Price"),
            prices.iter().map(|v| v.map(round5)).collect(),
        );
        table.push_column(
            &format!("REAL_MA{k}_ADR"),
            (0..n)
                .map(|i| match (prices[i], current_adr[i]) {
                    (Some(p), Some(adr)) => Some(round2(p / adr)),
                    _ => None,
                })
                .collect(),
        );
        table.push_column(
            &format!("REAL_MA{k}_RR"),
            (0..n)
                .map(|i| prices[i].map(|p| round2(p / reversal_size[i])))
                .collect(),
        );
    }

    trim_table(&mut table, &ma_periods)?;
    Ok(table)
}

/// MA-ordering regime. Strict inequalities; any tie falls through to 0.
fn classify_state(fast: f64, med: f64, slow: f64) -> i32 {
    if fast > med && med > slow {
        3
    } else if fast > slow && slow > med {
        2
    } else if slow > fast && fast > med {
        1
    } else if med > fast && fast > slow {
        -1
    } else if med > slow && slow > fast {
        -2
    } else if slow > med && med > fast {
        -3
    } else {
        0
    }
}

/// Type1 / Type2 pullback counters.
///
/// Both counters accumulate internally across every bar of a State regime and
/// reset when the State changes, but the column only carries the counter
/// value on bars that complete a pattern; all other bars hold 0.
#[allow(clippy::too_many_arguments)]
fn pullback_counters(
    state: &[i32],
    is_up: &[bool],
    is_dn: &[bool],
    open: &[f64],
    high: &[f64],
    low: &[f64],
    brick_size: &[f64],
    reversal_size: &[f64],
    ema1: &[Option<f64>],
) -> (Vec<i64>, Vec<i64>) {
    let n = state.len();
    let mut type1 = vec![0i64; n];
    let mut type2 = vec![0i64; n];
    let mut counter1 = 0i64;
    let mut counter2 = 0i64;
    let mut prev_state: Option<i32> = None;

    // Does any bar in [from, to] touch the fast EMA against the trend?
    let touches_ema = |from: usize, to: usize, up: bool| -> bool {
        (from..=to).any(|j| match ema1[j] {
            Some(e) => {
                if up {
                    low[j] <= e
                } else {
                    high[j] >= e
                }
            }
            None => false,
        })
    };

    for i in 0..n {
        if prev_state.is_some() && prev_state != Some(state[i]) {
            counter1 = 0;
            counter2 = 0;
        }
        prev_state = Some(state[i]);

        let use_3bar = reversal_size[i] > brick_size[i];

        // Type1: pullback-and-resume pattern closing at i, with an MA1 touch
        if use_3bar {
            if i > 1 {
                if state[i] == 3 && is_up[i] && is_up[i - 1] && is_dn[i - 2]
                    && touches_ema(i - 2, i, true)
                {
                    counter1 += 1;
                    type1[i] = counter1;
                } else if state[i] == -3 && is_dn[i] && is_dn[i - 1] && is_up[i - 2]
                    && touches_ema(i - 2, i, false)
                {
                    counter1 -= 1;
                    type1[i] = counter1;
                }
            }
        } else if i > 0 {
            if state[i] == 3 && is_up[i] && is_dn[i - 1] && touches_ema(i - 1, i, true) {
                counter1 += 1;
                type1[i] = counter1;
            } else if state[i] == -3 && is_dn[i] && is_up[i - 1] && touches_ema(i - 1, i, false) {
                counter1 -= 1;
                type1[i] = counter1;
            }
        }

        // Type2: with-trend bar whose wick exceeds one brick
        let prior_same_direction = |up: bool| -> bool {
            if !use_3bar {
                return true;
            }
            if i == 0 {
                return false;
            }
            if up {
                is_up[i - 1]
            } else {
                is_dn[i - 1]
            }
        };
        if state[i] == 3
            && is_up[i]
            && round5(open[i] - low[i]) > brick_size[i]
            && prior_same_direction(true)
        {
            counter2 += 1;
            type2[i] = counter2;
        } else if state[i] == -3
            && is_dn[i]
            && round5(high[i] - open[i]) > brick_size[i]
            && prior_same_direction(false)
        {
            counter2 -= 1;
            type2[i] = counter2;
        }
    }

    (type1, type2)
}

/// Trim warmup rows from the front and unresolved forward-scan rows from the
/// back. Errors when no row satisfies both.
fn trim_table(table: &mut FeatureTable, ma_periods: &[usize; 3]) -> Result<()> {
    let mut left_cols = vec!["currentADR".to_string()];
    for p in ma_periods {
        left_cols.push(format!("EMA_rawDistance({p})"));
    }
    left_cols.push("SMAE1_Center".to_string());
    left_cols.push("SMAE2_Center".to_string());

    let right_cols: Vec<String> = (1..=3).map(|k| format!("REAL_MA{k}_Price")).collect();

    let n = table.len();
    let all_defined = |cols: &[String], i: usize| -> bool {
        cols.iter().all(|c| {
            table
                .column(c)
                .map(|col| col[i].is_some())
                .unwrap_or(false)
        })
    };

    let left = (0..n).find(|&i| all_defined(&left_cols, i));
    let right = (0..n).rev().find(|&i| all_defined(&right_cols, i));

    match (left, right) {
        (Some(l), Some(r)) if l <= r => {
            table.retain_rows(l, r);
            Ok(())
        }
        _ => Err(RenkoError::EmptyInput(
            "no rows remain after warmup and forward-scan trims".to_string(),
        )),
    }
}
