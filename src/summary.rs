//! Distributional statistics over a feature table.
//!
//! Aggregates the per-brick columns into the report consumed by the research
//! UI: bar location versus the MAs, run-length distributions and decay,
//! state distribution and transitions, chop regimes, pullback-signal
//! excursion distributions, and wick distributions.

use crate::table::FeatureTable;
use crate::types::round2;
use serde::Serialize;

const RUN_THRESHOLDS: [i64; 15] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 20, 50, 100, 200, 500];
const RR_THRESHOLDS: [f64; 9] = [0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0, 20.0, 50.0];
const STATES: [i32; 6] = [3, 2, 1, -1, -2, -3];
const HEATMAP_MAX_CONBARS: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DecayRow {
    pub threshold: f64,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistBin {
    pub label: String,
    pub count: usize,
    pub pct: f64,
}

/// Bars above/below one MA, split by bar direction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaLocationStats {
    pub period: usize,
    pub above: usize,
    pub below: usize,
    pub above_up: usize,
    pub above_down: usize,
    pub below_up: usize,
    pub below_down: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AllMaStats {
    pub above_all: usize,
    pub below_all: usize,
    pub above_all_up: usize,
    pub above_all_down: usize,
    pub below_all_up: usize,
    pub below_all_down: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub up_runs: Vec<i64>,
    pub dn_runs: Vec<i64>,
    pub up_decay: Vec<DecayRow>,
    pub dn_decay: Vec<DecayRow>,
    pub up_dist: Vec<DistBin>,
    pub dn_dist: Vec<DistBin>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChopStats {
    pub reversal_bars: usize,
    pub chop_index: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateStats {
    pub state: i32,
    pub count: usize,
    pub pct: f64,
    pub up_count: usize,
    pub up_pct: f64,
    pub dn_count: usize,
    pub dn_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionCell {
    pub state: i32,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionRow {
    pub from_state: i32,
    pub total: usize,
    pub to: Vec<TransitionCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapCell {
    pub state: i32,
    pub count: usize,
    pub avg_rr: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapRow {
    pub con_bars: i64,
    pub cells: Vec<HeatmapCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChopRegimeRow {
    pub key: &'static str,
    pub label: &'static str,
    pub count: usize,
    pub up_pct: f64,
    pub dn_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateByChopRow {
    pub state: i32,
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChopRegimeStats {
    pub overview: Vec<ChopRegimeRow>,
    pub state_by_chop: Vec<StateByChopRow>,
}

/// Excursion distributions for the Type1 pullback signals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Type1MfeStats {
    pub up_total: usize,
    pub dn_total: usize,
    pub up_decay: Vec<DecayRow>,
    pub dn_decay: Vec<DecayRow>,
    pub up_adr_dist: Vec<DistBin>,
    pub dn_adr_dist: Vec<DistBin>,
    pub up_rr_dist: Vec<DistBin>,
    pub dn_rr_dist: Vec<DistBin>,
    pub up_ma_rr_dist: Vec<Vec<DistBin>>,
    pub dn_ma_rr_dist: Vec<Vec<DistBin>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WickDist {
    pub up_dist: Vec<DistBin>,
    pub dn_dist: Vec<DistBin>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmaRrDecay {
    pub period: usize,
    pub up_total: usize,
    pub dn_total: usize,
    pub up_decay: Vec<DecayRow>,
    pub dn_decay: Vec<DecayRow>,
}

/// The full distributional report.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub total_bars: usize,
    pub up_bars: usize,
    pub dn_bars: usize,
    pub ma_periods: [usize; 3],
    pub ma_stats: Vec<MaLocationStats>,
    pub all_ma_stats: AllMaStats,
    pub beyond_ma_stats: Vec<MaLocationStats>,
    pub beyond_all_ma_stats: AllMaStats,
    pub run_stats: RunStats,
    pub chop_stats: ChopStats,
    pub state_stats: Vec<StateStats>,
    pub state_transition_matrix: Vec<TransitionRow>,
    pub state_conbars_heatmap: Vec<HeatmapRow>,
    pub chop_regime_stats: ChopRegimeStats,
    pub type1_mfe_stats: Type1MfeStats,
    pub wick_dist: WickDist,
    pub ema_rr_decay: Vec<EmaRrDecay>,
    pub session_breaks: Vec<usize>,
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

fn pct0(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64 * 100.0).round()
    }
}

/// Count-at-or-above table over a fixed threshold ladder. `whole_percent`
/// rounds pct to an integer; otherwise one decimal place.
fn decay(
    values: &[f64],
    thresholds: &[f64],
    skip_empty_rows: bool,
    whole_percent: bool,
) -> Vec<DecayRow> {
    let total = values.len();
    thresholds
        .iter()
        .filter_map(|&t| {
            let count = values.iter().filter(|&&v| v >= t).count();
            if skip_empty_rows && count == 0 {
                return None;
            }
            Some(DecayRow {
                threshold: t,
                count,
                pct: if whole_percent {
                    pct0(count, total)
                } else {
                    pct(count, total)
                },
            })
        })
        .collect()
}

/// Fixed decimal bins for normalized excursion values: an exact-zero row,
/// then half-unit ranges widening to a 5+ tail.
fn decimal_dist(values: &[f64], use_abs: bool) -> Vec<DistBin> {
    let values: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| if use_abs { v.abs() } else { v })
        .collect();
    if values.is_empty() {
        return Vec::new();
    }
    let total = values.len();

    let edges: [(f64, f64, &str); 7] = [
        (0.0, 0.5, ">0 to <0.5"),
        (0.5, 1.0, "0.5 to <1"),
        (1.0, 1.5, "1 to <1.5"),
        (1.5, 2.0, "1.5 to <2"),
        (2.0, 3.0, "2 to <3"),
        (3.0, 5.0, "3 to <5"),
        (5.0, f64::INFINITY, "5+"),
    ];

    let mut dist = Vec::with_capacity(edges.len() + 1);
    let zero_count = values.iter().filter(|&&v| v == 0.0).count();
    dist.push(DistBin {
        label: "0".to_string(),
        count: zero_count,
        pct: pct(zero_count, total),
    });
    for (i, (low, high, label)) in edges.iter().enumerate() {
        let count = if i == 0 {
            values.iter().filter(|&&v| *low < v && v < *high).count()
        } else {
            values.iter().filter(|&&v| *low <= v && v < *high).count()
        };
        dist.push(DistBin {
            label: label.to_string(),
            count,
            pct: pct(count, total),
        });
    }
    dist
}

/// Unified run-length bins: singletons 1-10, then widening ranges.
fn run_bins(max_run: i64) -> Vec<(i64, i64, String)> {
    let mut bins = Vec::new();
    for i in 1..=max_run.min(10) {
        bins.push((i, i, i.to_string()));
    }
    for (start, end) in [(11, 20), (21, 50), (51, 100), (101, 200), (201, 500), (501, 1000)] {
        if start <= max_run {
            let actual_end = end.min(max_run);
            let label = if start == actual_end {
                start.to_string()
            } else {
                format!("{start}-{actual_end}")
            };
            bins.push((start, actual_end, label));
        }
    }
    bins
}

fn run_dist(runs: &[i64], bins: &[(i64, i64, String)]) -> Vec<DistBin> {
    let total = runs.len();
    bins.iter()
        .map(|(start, end, label)| {
            let count = runs.iter().filter(|&&r| *start <= r && r <= *end).count();
            DistBin {
                label: label.clone(),
                count,
                pct: pct(count, total),
            }
        })
        .collect()
}

/// Direction split of a masked subset: (total, up, down).
fn split_mask(mask: &[bool], is_up: &[bool], is_dn: &[bool]) -> (usize, usize, usize) {
    let mut count = 0;
    let mut up = 0;
    let mut dn = 0;
    for i in 0..mask.len() {
        if mask[i] {
            count += 1;
            if is_up[i] {
                up += 1;
            }
            if is_dn[i] {
                dn += 1;
            }
        }
    }
    (count, up, dn)
}

/// Build the full distributional report from a feature table.
pub fn summarize_table(table: &FeatureTable) -> SummaryReport {
    let n = table.len();
    let settings = table.settings();
    let ma_periods = [
        settings.ma1_period,
        settings.ma2_period,
        settings.ma3_period,
    ];

    // Dense copies with NaN for undefined; NaN compares false everywhere
    let dense = |name: &str| -> Vec<f64> {
        table
            .column(name)
            .map(|c| c.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .unwrap_or_else(|| vec![f64::NAN; n])
    };
    let open = dense("open");
    let close = dense("close");
    let high = dense("high");
    let low = dense("low");

    let is_up: Vec<bool> = (0..n).map(|i| close[i] > open[i]).collect();
    let is_dn: Vec<bool> = (0..n).map(|i| close[i] < open[i]).collect();
    let up_bars = is_up.iter().filter(|&&b| b).count();
    let dn_bars = is_dn.iter().filter(|&&b| b).count();

    // Location relative to each MA, from the raw distance columns
    let mut ma_stats = Vec::new();
    let mut beyond_ma_stats = Vec::new();
    let mut above_all_mask = vec![true; n];
    let mut below_all_mask = vec![true; n];
    let mut beyond_above_all_mask = vec![true; n];
    let mut beyond_below_all_mask = vec![true; n];

    for &period in &ma_periods {
        let dist = dense(&format!("EMA_rawDistance({period})"));
        let mut stats = MaLocationStats { period, ..Default::default() };
        let mut beyond = MaLocationStats { period, ..Default::default() };

        for i in 0..n {
            let above = dist[i] > 0.0;
            let below = dist[i] < 0.0;
            above_all_mask[i] &= above;
            below_all_mask[i] &= below;
            if above {
                stats.above += 1;
                if is_up[i] {
                    stats.above_up += 1;
                }
                if is_dn[i] {
                    stats.above_down += 1;
                }
            }
            if below {
                stats.below += 1;
                if is_up[i] {
                    stats.below_up += 1;
                }
                if is_dn[i] {
                    stats.below_down += 1;
                }
            }

            // Whole-bar location: the EMA is close minus rawDistance
            let ema = close[i] - dist[i];
            let beyond_above = low[i] > ema;
            let beyond_below = high[i] < ema;
            beyond_above_all_mask[i] &= beyond_above;
            beyond_below_all_mask[i] &= beyond_below;
            if beyond_above {
                beyond.above += 1;
                if is_up[i] {
                    beyond.above_up += 1;
                }
                if is_dn[i] {
                    beyond.above_down += 1;
                }
            }
            if beyond_below {
                beyond.below += 1;
                if is_up[i] {
                    beyond.below_up += 1;
                }
                if is_dn[i] {
                    beyond.below_down += 1;
                }
            }
        }
        ma_stats.push(stats);
        beyond_ma_stats.push(beyond);
    }

    let all_stats = |above_mask: &[bool], below_mask: &[bool]| -> AllMaStats {
        let (above_all, above_all_up, above_all_down) = split_mask(above_mask, &is_up, &is_dn);
        let (below_all, below_all_up, below_all_down) = split_mask(below_mask, &is_up, &is_dn);
        AllMaStats {
            above_all,
            below_all,
            above_all_up,
            above_all_down,
            below_all_up,
            below_all_down,
        }
    };
    let all_ma_stats = all_stats(&above_all_mask, &below_all_mask);
    let beyond_all_ma_stats = all_stats(&beyond_above_all_mask, &beyond_below_all_mask);

    // Completed run lengths from the consecutive counters
    let mut run_stats = RunStats::default();
    if table.has_column("Con_UP_bars") && table.has_column("Con_DN_bars") {
        let con_up = dense("Con_UP_bars");
        let con_dn = dense("Con_DN_bars");
        let at = |col: &[f64], i: usize| -> i64 {
            if col[i].is_finite() {
                col[i] as i64
            } else {
                0
            }
        };
        for i in 1..n {
            if at(&con_up, i - 1) > 0 && at(&con_up, i) == 0 {
                run_stats.up_runs.push(at(&con_up, i - 1));
            }
            if at(&con_dn, i - 1) > 0 && at(&con_dn, i) == 0 {
                run_stats.dn_runs.push(at(&con_dn, i - 1));
            }
        }
        if n > 0 {
            // A run still in progress at the end still counts
            if at(&con_up, n - 1) > 0 {
                run_stats.up_runs.push(at(&con_up, n - 1));
            }
            if at(&con_dn, n - 1) > 0 {
                run_stats.dn_runs.push(at(&con_dn, n - 1));
            }
        }

        let max_either = run_stats
            .up_runs
            .iter()
            .chain(run_stats.dn_runs.iter())
            .copied()
            .max()
            .unwrap_or(0);
        let active: Vec<f64> = RUN_THRESHOLDS
            .iter()
            .filter(|&&t| t <= max_either)
            .map(|&t| t as f64)
            .collect();
        let up_f: Vec<f64> = run_stats.up_runs.iter().map(|&r| r as f64).collect();
        let dn_f: Vec<f64> = run_stats.dn_runs.iter().map(|&r| r as f64).collect();
        run_stats.up_decay = decay(&up_f, &active, false, false);
        run_stats.dn_decay = decay(&dn_f, &active, false, false);

        let bins = run_bins(max_either);
        run_stats.up_dist = run_dist(&run_stats.up_runs, &bins);
        run_stats.dn_dist = run_dist(&run_stats.dn_runs, &bins);
    }

    // Global chop: direction reversals ignoring dojis
    let mut chop_stats = ChopStats::default();
    if n > 1 {
        let dir = |i: usize| -> i32 {
            if is_up[i] {
                1
            } else if is_dn[i] {
                -1
            } else {
                0
            }
        };
        let reversal_count = (1..n)
            .filter(|&i| dir(i) != 0 && dir(i - 1) != 0 && dir(i) != dir(i - 1))
            .count();
        chop_stats.reversal_bars = reversal_count;
        chop_stats.chop_index = pct(reversal_count, n);
    }

    // State distribution
    let has_state = table.has_column("State");
    let state = dense("State");
    let state_at = |i: usize| -> Option<i32> {
        if state[i].is_finite() {
            Some(state[i] as i32)
        } else {
            None
        }
    };
    let mut state_stats = Vec::new();
    if has_state {
        for &s in &STATES {
            let mask: Vec<bool> = (0..n).map(|i| state_at(i) == Some(s)).collect();
            let (count, up, dn) = split_mask(&mask, &is_up, &is_dn);
            state_stats.push(StateStats {
                state: s,
                count,
                pct: pct(count, n),
                up_count: up,
                up_pct: pct0(up, count),
                dn_count: dn,
                dn_pct: pct0(dn, count),
            });
        }
    }

    // Transition matrix from prState -> State
    let mut state_transition_matrix = Vec::new();
    if has_state && table.has_column("prState") {
        let pr_state = dense("prState");
        for &from in &STATES {
            let from_mask: Vec<bool> = (0..n)
                .map(|i| pr_state[i].is_finite() && pr_state[i] as i32 == from)
                .collect();
            let total = from_mask.iter().filter(|&&b| b).count();
            let to = STATES
                .iter()
                .map(|&s| {
                    let count = (0..n)
                        .filter(|&i| from_mask[i] && state_at(i) == Some(s))
                        .count();
                    TransitionCell {
                        state: s,
                        count,
                        pct: pct(count, total),
                    }
                })
                .collect();
            state_transition_matrix.push(TransitionRow {
                from_state: from,
                total,
                to,
            });
        }
    }

    // State x with-trend consecutive-bars heatmap of mean REAL_clr_RR
    let mut state_conbars_heatmap = Vec::new();
    if has_state
        && table.has_column("REAL_clr_RR")
        && table.has_column("Con_UP_bars")
        && table.has_column("Con_DN_bars")
    {
        let real_rr = table.column("REAL_clr_RR").unwrap_or_default();
        let con_up = dense("Con_UP_bars");
        let con_dn = dense("Con_DN_bars");
        for con in 1..=HEATMAP_MAX_CONBARS {
            let cells = STATES
                .iter()
                .map(|&s| {
                    let con_col = if s > 0 { &con_up } else { &con_dn };
                    let in_cell: Vec<usize> = (0..n)
                        .filter(|&i| {
                            state_at(i) == Some(s)
                                && con_col[i].is_finite()
                                && con_col[i] as i64 == con
                        })
                        .collect();
                    let hits: Vec<f64> = in_cell.iter().filter_map(|&i| real_rr[i]).collect();
                    let avg_rr = if hits.is_empty() {
                        None
                    } else {
                        Some(round2(hits.iter().sum::<f64>() / hits.len() as f64))
                    };
                    HeatmapCell {
                        state: s,
                        count: in_cell.len(),
                        avg_rr,
                    }
                })
                .collect();
            state_conbars_heatmap.push(HeatmapRow { con_bars: con, cells });
        }
    }

    // Chop regimes: low / mid / high rolling-chop environments
    let mut chop_regime_stats = ChopRegimeStats::default();
    if table.has_column("chop(rolling)") {
        let chop = dense("chop(rolling)");
        let regimes: [(&'static str, &'static str, fn(f64) -> bool); 3] = [
            ("low", "Low (<0.2)", |c| c < 0.2),
            ("mid", "Mid (0.2-0.4)", |c| (0.2..=0.4).contains(&c)),
            ("high", "High (>0.4)", |c| c > 0.4),
        ];
        for (key, label, test) in regimes {
            let mask: Vec<bool> = (0..n).map(|i| test(chop[i])).collect();
            let (count, up, dn) = split_mask(&mask, &is_up, &is_dn);
            chop_regime_stats.overview.push(ChopRegimeRow {
                key,
                label,
                count,
                up_pct: pct0(up, count),
                dn_pct: pct0(dn, count),
            });
        }
        if has_state {
            for &s in &STATES {
                let mut row = StateByChopRow { state: s, low: 0.0, mid: 0.0, high: 0.0 };
                for (key, _, test) in regimes {
                    let regime_total = (0..n).filter(|&i| test(chop[i])).count();
                    let in_state = (0..n)
                        .filter(|&i| test(chop[i]) && state_at(i) == Some(s))
                        .count();
                    let value = pct(in_state, regime_total);
                    match key {
                        "low" => row.low = value,
                        "mid" => row.mid = value,
                        _ => row.high = value,
                    }
                }
                chop_regime_stats.state_by_chop.push(row);
            }
        }
    }

    // Type1 signal excursions
    let mut type1_mfe_stats = Type1MfeStats::default();
    if table.has_column("Type1") && table.has_column("MFE_clr_Bars") {
        let type1 = dense("Type1");
        let up_mask: Vec<bool> = (0..n).map(|i| type1[i] > 0.0).collect();
        let dn_mask: Vec<bool> = (0..n).map(|i| type1[i] < 0.0).collect();

        let masked = |mask: &[bool], name: &str| -> Vec<f64> {
            let col = dense(name);
            (0..n)
                .filter(|&i| mask[i] && col[i].is_finite())
                .map(|i| col[i])
                .collect()
        };

        type1_mfe_stats.up_total = up_mask.iter().filter(|&&b| b).count();
        type1_mfe_stats.dn_total = dn_mask.iter().filter(|&&b| b).count();
        let thresholds: Vec<f64> = RUN_THRESHOLDS.iter().map(|&t| t as f64).collect();
        type1_mfe_stats.up_decay = decay(&masked(&up_mask, "MFE_clr_Bars"), &thresholds, true, false);
        type1_mfe_stats.dn_decay = decay(&masked(&dn_mask, "MFE_clr_Bars"), &thresholds, true, false);

        if table.has_column("MFE_clr_ADR") {
            type1_mfe_stats.up_adr_dist = decimal_dist(&masked(&up_mask, "MFE_clr_ADR"), false);
            type1_mfe_stats.dn_adr_dist = decimal_dist(&masked(&dn_mask, "MFE_clr_ADR"), true);
        }
        if table.has_column("MFE_clr_RR") {
            type1_mfe_stats.up_rr_dist = decimal_dist(&masked(&up_mask, "MFE_clr_RR"), false);
            type1_mfe_stats.dn_rr_dist = decimal_dist(&masked(&dn_mask, "MFE_clr_RR"), true);
        }
        for k in 1..=3 {
            let name = format!("REAL_MA{k}_RR");
            if table.has_column(&name) {
                type1_mfe_stats
                    .up_ma_rr_dist
                    .push(decimal_dist(&masked(&up_mask, &name), false));
                type1_mfe_stats
                    .dn_ma_rr_dist
                    .push(decimal_dist(&masked(&dn_mask, &name), true));
            }
        }
    }

    // Wick depth distribution split by direction
    let mut wick_dist = WickDist::default();
    if table.has_column("DD_RR") {
        let dd_rr = dense("DD_RR");
        let up_vals: Vec<f64> = (0..n)
            .filter(|&i| is_up[i] && dd_rr[i].is_finite())
            .map(|i| dd_rr[i])
            .collect();
        let dn_vals: Vec<f64> = (0..n)
            .filter(|&i| is_dn[i] && dd_rr[i].is_finite())
            .map(|i| dd_rr[i])
            .collect();
        wick_dist.up_dist = decimal_dist(&up_vals, false);
        wick_dist.dn_dist = decimal_dist(&dn_vals, false);
    }

    // EMA RR-distance decay per MA
    let mut ema_rr_decay = Vec::new();
    for &period in &ma_periods {
        let name = format!("EMA_rrDistance({period})");
        if table.has_column(&name) {
            let values = dense(&name);
            let pos: Vec<f64> = values.iter().filter(|&&v| v > 0.0).copied().collect();
            let neg: Vec<f64> = values.iter().filter(|&&v| v < 0.0).map(|v| v.abs()).collect();
            ema_rr_decay.push(EmaRrDecay {
                period,
                up_total: pos.len(),
                dn_total: neg.len(),
                // This table reports whole-percent values, unlike the
                // one-decimal run and Type1 decay tables
                up_decay: decay(&pos, &RR_THRESHOLDS, false, true),
                dn_decay: decay(&neg, &RR_THRESHOLDS, false, true),
            });
        }
    }

    // Indices where the session date changes
    let session_dates = table.session_dates();
    let session_breaks: Vec<usize> = (1..n)
        .filter(|&i| session_dates[i] != session_dates[i - 1])
        .collect();

    SummaryReport {
        total_bars: n,
        up_bars,
        dn_bars,
        ma_periods,
        ma_stats,
        all_ma_stats,
        beyond_ma_stats,
        beyond_all_ma_stats,
        run_stats,
        chop_stats,
        state_stats,
        state_transition_matrix,
        state_conbars_heatmap,
        chop_regime_stats,
        type1_mfe_stats,
        wick_dist,
        ema_rr_decay,
        session_breaks,
    }
}
