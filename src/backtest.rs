//! Forward-scanning backtest over the feature table.
//!
//! Entries come from expression signals; each entry walks forward bar by bar
//! under fixed-stop/target rules until the stop, the target, or the end of
//! data. Stops are checked before targets on every bar. Entries across all
//! signals are evaluated in ascending index order; with overlap disallowed,
//! an entry inside the previous trade's span is skipped.

use crate::error::{RenkoError, Result};
use crate::expr::{matching_indices, SignalDef};
use crate::table::FeatureTable;
use crate::types::{round2, round5};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the stop distance is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    /// Multiple of the entry bar's reversal size.
    Rr,
    /// Multiple of the entry bar's ADR, floored at one reversal size.
    Adr,
}

/// Exit rule for the profitable side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    FixedRr,
    FixedAdr,
    /// Exit when an opposite-color bar closes beyond the chosen EMA.
    MaTrail,
    /// Exit on the first opposite-color bar.
    ColorChange,
}

/// Unit trade results are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportUnit {
    Rr,
    Adr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub stop_type: StopType,
    pub stop_value: f64,
    pub target_type: TargetType,
    pub target_value: f64,
    #[serde(default = "default_target_ma")]
    pub target_ma: u8,
    #[serde(default = "default_report_unit")]
    pub report_unit: ReportUnit,
    #[serde(default = "default_allow_overlap")]
    pub allow_overlap: bool,
}

fn default_target_ma() -> u8 {
    1
}

fn default_report_unit() -> ReportUnit {
    ReportUnit::Rr
}

fn default_allow_overlap() -> bool {
    true
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.stop_value.is_finite() || self.stop_value <= 0.0 {
            return Err(RenkoError::InvalidConfig(format!(
                "stop_value must be positive, got {}",
                self.stop_value
            )));
        }
        if !(1..=3).contains(&self.target_ma) {
            return Err(RenkoError::InvalidConfig(format!(
                "target_ma must be 1, 2 or 3, got {}",
                self.target_ma
            )));
        }
        if matches!(self.target_type, TargetType::FixedRr | TargetType::FixedAdr)
            && (!self.target_value.is_finite() || self.target_value <= 0.0)
        {
            return Err(RenkoError::InvalidConfig(format!(
                "target_value must be positive for fixed targets, got {}",
                self.target_value
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Long => write!(f, "LONG"),
            TradeDirection::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Target,
    Stop,
    Open,
}

/// One simulated trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub direction: TradeDirection,
    pub outcome: TradeOutcome,
    /// Signed result in the configured report unit, rounded to 2 decimals.
    pub result: f64,
    pub bars_held: usize,
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
}

/// Aggregate statistics over one signal's trades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSummary {
    pub count: usize,
    pub wins: usize,
    pub losses: usize,
    pub open: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub total_r: f64,
    pub max_drawdown: f64,
    pub sharpe: Option<f64>,
    pub max_consec_wins: usize,
    pub max_consec_losses: usize,
    pub avg_bars_held: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResult {
    pub trades: Vec<Trade>,
    pub summary: SignalSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub signals: BTreeMap<String, SignalResult>,
    pub errors: BTreeMap<String, String>,
    pub config: BacktestConfig,
}

/// Run the backtest for every signal against the table.
pub fn run_backtest(
    table: &FeatureTable,
    signals: &[SignalDef],
    config: &BacktestConfig,
) -> Result<BacktestReport> {
    config.validate()?;
    let n = table.len();
    if n == 0 {
        return Err(RenkoError::EmptyInput("feature table has no rows".to_string()));
    }

    let close = dense(table, "close")?;
    let open = dense(table, "open")?;
    let reversal = dense(table, "reversal_size")?;
    let adr: Vec<f64> = required(table, "currentADR")?
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    let is_up: Vec<bool> = (0..n).map(|i| close[i] > open[i]).collect();
    let timestamps = table.timestamps();

    // EMA series for the ma_trail target
    let ema = if matches!(config.target_type, TargetType::MaTrail) {
        Some(required(table, &format!("EMA{}_Price", config.target_ma))?.to_vec())
    } else {
        None
    };

    let mut errors = BTreeMap::new();
    let mut all_entries: Vec<(usize, &str)> = Vec::new();
    for signal in signals {
        if signal.expression.trim().is_empty() {
            continue;
        }
        match matching_indices(table, &signal.expression) {
            Ok(indices) => {
                all_entries.extend(indices.into_iter().map(|i| (i, signal.name.as_str())));
            }
            Err(e) => {
                errors.insert(signal.name.clone(), e.to_string());
            }
        }
    }
    // Stable sort keeps the input signal order on index ties
    all_entries.sort_by_key(|&(i, _)| i);

    let mut trades_by_signal: BTreeMap<String, Vec<Trade>> = BTreeMap::new();
    let mut next_allowed_entry = 0usize;

    for (i, sig_name) in all_entries {
        if i >= n - 1 {
            continue;
        }
        if !config.allow_overlap && i < next_allowed_entry {
            continue;
        }

        let entry_close = close[i];
        let entry_rev = reversal[i];
        let entry_adr = adr[i];
        let entry_is_up = is_up[i];
        let direction = if entry_is_up {
            TradeDirection::Long
        } else {
            TradeDirection::Short
        };

        let stop_dist = match config.stop_type {
            StopType::Adr => (config.stop_value * entry_adr).max(entry_rev),
            StopType::Rr => config.stop_value * entry_rev,
        };
        let stop_price = if entry_is_up {
            entry_close - stop_dist
        } else {
            entry_close + stop_dist
        };

        let target_dist = match config.target_type {
            TargetType::FixedRr => Some(config.target_value * entry_rev),
            TargetType::FixedAdr => Some(config.target_value * entry_adr),
            TargetType::MaTrail | TargetType::ColorChange => None,
        };

        let normalize = |move_size: f64| match config.report_unit {
            ReportUnit::Adr => move_size / entry_adr,
            ReportUnit::Rr => move_size / entry_rev,
        };

        let mut outcome = TradeOutcome::Open;
        let mut result = 0.0;
        let mut bars_held = 0usize;
        let mut exit_idx: Option<usize> = None;

        for j in i + 1..n {
            bars_held = j - i;

            let stopped = if entry_is_up {
                close[j] <= stop_price
            } else {
                close[j] >= stop_price
            };
            if stopped {
                outcome = TradeOutcome::Stop;
                result = -normalize(stop_dist);
                exit_idx = Some(j);
                break;
            }

            match config.target_type {
                TargetType::FixedRr | TargetType::FixedAdr => {
                    let dist = target_dist.unwrap();
                    let hit = if entry_is_up {
                        close[j] >= entry_close + dist
                    } else {
                        close[j] <= entry_close - dist
                    };
                    if hit {
                        outcome = TradeOutcome::Target;
                        result = normalize(dist);
                        exit_idx = Some(j);
                        break;
                    }
                }
                TargetType::MaTrail => {
                    if is_up[j] != entry_is_up {
                        let series = ema.as_ref().unwrap();
                        if let Some(ema_j) = series[j] {
                            let exited = if entry_is_up {
                                close[j] < ema_j
                            } else {
                                close[j] > ema_j
                            };
                            if exited {
                                let move_size = if entry_is_up {
                                    close[j] - entry_close
                                } else {
                                    entry_close - close[j]
                                };
                                outcome = TradeOutcome::Target;
                                result = normalize(move_size);
                                exit_idx = Some(j);
                                break;
                            }
                        }
                    }
                }
                TargetType::ColorChange => {
                    if is_up[j] != entry_is_up {
                        let move_size = if entry_is_up {
                            close[j] - entry_close
                        } else {
                            entry_close - close[j]
                        };
                        outcome = TradeOutcome::Target;
                        result = normalize(move_size);
                        exit_idx = Some(j);
                        break;
                    }
                }
            }
        }

        if outcome == TradeOutcome::Open {
            bars_held = n - 1 - i;
            let move_size = if entry_is_up {
                close[n - 1] - entry_close
            } else {
                entry_close - close[n - 1]
            };
            result = normalize(move_size);
            exit_idx = Some(n - 1);
        }

        let exit_idx = exit_idx.unwrap();
        trades_by_signal
            .entry(sig_name.to_string())
            .or_default()
            .push(Trade {
                entry_index: i,
                entry_time: timestamps[i],
                entry_price: round5(entry_close),
                direction,
                outcome,
                result: round2(result),
                bars_held,
                exit_index: exit_idx,
                exit_time: timestamps[exit_idx],
                exit_price: round5(close[exit_idx]),
            });
        if !config.allow_overlap {
            next_allowed_entry = exit_idx + 1;
        }
    }

    let mut results = BTreeMap::new();
    for signal in signals {
        if signal.expression.trim().is_empty() || errors.contains_key(&signal.name) {
            continue;
        }
        let trades = trades_by_signal.remove(&signal.name).unwrap_or_default();
        let summary = summarize(&trades);
        results.insert(signal.name.clone(), SignalResult { trades, summary });
    }

    Ok(BacktestReport {
        signals: results,
        errors,
        config: config.clone(),
    })
}

fn dense(table: &FeatureTable, name: &str) -> Result<Vec<f64>> {
    Ok(required(table, name)?
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn required<'a>(table: &'a FeatureTable, name: &str) -> Result<&'a [Option<f64>]> {
    table.column(name).ok_or_else(|| {
        RenkoError::InvalidConfig(format!("feature table is missing column '{name}'"))
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round3(v: f64) -> f64 {
    (v * 1e3).round() / 1e3
}

/// Aggregate one signal's trade list.
fn summarize(trades: &[Trade]) -> SignalSummary {
    let count = trades.len();
    let closed: Vec<&Trade> = trades
        .iter()
        .filter(|t| t.outcome != TradeOutcome::Open)
        .collect();
    let wins: Vec<&&Trade> = closed.iter().filter(|t| t.result > 0.0).collect();
    let losses: Vec<&&Trade> = closed.iter().filter(|t| t.result <= 0.0).collect();
    let open = count - closed.len();

    let win_count = wins.len();
    let loss_count = losses.len();
    let closed_count = win_count + loss_count;

    let gross_profit: f64 = wins.iter().map(|t| t.result).sum();
    let gross_loss: f64 = losses.iter().map(|t| t.result).sum::<f64>().abs();
    let total_r: f64 = trades.iter().map(|t| t.result).sum();

    let win_rate = if closed_count > 0 {
        win_count as f64 / closed_count as f64
    } else {
        0.0
    };
    let avg_win = if win_count > 0 {
        gross_profit / win_count as f64
    } else {
        0.0
    };
    let avg_loss = if loss_count > 0 {
        losses.iter().map(|t| t.result).sum::<f64>() / loss_count as f64
    } else {
        0.0
    };
    // 999.99 stands in for a true infinity (no losing trades); finite
    // ratios are reported as computed
    let profit_factor = if gross_loss > 0.0 {
        round2(gross_profit / gross_loss)
    } else if gross_profit > 0.0 {
        999.99
    } else {
        0.0
    };
    let expectancy = if closed_count > 0 {
        total_r / closed_count as f64
    } else {
        0.0
    };

    // Peak-to-trough of the cumulative result curve, in trade order
    let mut cum = 0.0;
    let mut peak = 0.0;
    let mut max_drawdown = 0.0f64;
    for t in trades {
        cum += t.result;
        if cum > peak {
            peak = cum;
        }
        max_drawdown = max_drawdown.max(peak - cum);
    }

    // Sharpe over decisively closed trades, sample standard deviation
    let closed_results: Vec<f64> = trades
        .iter()
        .filter(|t| matches!(t.outcome, TradeOutcome::Target | TradeOutcome::Stop))
        .map(|t| t.result)
        .collect();
    let sharpe = if closed_results.len() >= 2 {
        let mean = closed_results.iter().sum::<f64>() / closed_results.len() as f64;
        let var = closed_results.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (closed_results.len() - 1) as f64;
        let std = var.sqrt();
        if std > 0.0 {
            Some(round2(mean / std))
        } else {
            None
        }
    } else {
        None
    };

    let mut max_consec_wins = 0usize;
    let mut max_consec_losses = 0usize;
    let mut cur_wins = 0usize;
    let mut cur_losses = 0usize;
    for t in trades {
        if t.outcome == TradeOutcome::Open {
            continue;
        }
        if t.result > 0.0 {
            cur_wins += 1;
            cur_losses = 0;
        } else if t.result < 0.0 {
            cur_losses += 1;
            cur_wins = 0;
        } else {
            cur_wins = 0;
            cur_losses = 0;
        }
        max_consec_wins = max_consec_wins.max(cur_wins);
        max_consec_losses = max_consec_losses.max(cur_losses);
    }

    let avg_bars = if count > 0 {
        trades.iter().map(|t| t.bars_held as f64).sum::<f64>() / count as f64
    } else {
        0.0
    };

    SignalSummary {
        count,
        wins: win_count,
        losses: loss_count,
        open,
        win_rate: round3(win_rate),
        avg_win: round2(avg_win),
        avg_loss: round2(avg_loss),
        profit_factor,
        expectancy: round2(expectancy),
        total_r: round2(total_r),
        max_drawdown: round2(max_drawdown),
        sharpe,
        max_consec_wins,
        max_consec_losses,
        avg_bars_held: round1(avg_bars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renko::WickMode;
    use crate::table::TableSettings;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn settings() -> TableSettings {
        TableSettings {
            adr_period: 14,
            brick_size: 0.001,
            reversal_size: 0.002,
            wick_mode: WickMode::All,
            ma1_period: 20,
            ma2_period: 50,
            ma3_period: 200,
            chop_period: 20,
            smae1_period: 20,
            smae1_deviation: 1.0,
            smae2_period: 50,
            smae2_deviation: 1.0,
            pwap_sigmas: vec![1.0],
        }
    }

    /// Table where every bar's direction and close are given directly.
    fn table_from(closes: &[f64], dirs: &[i8]) -> FeatureTable {
        let n = closes.len();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let mut table = FeatureTable::new(
            (0..n).map(|i| t0 + chrono::Duration::minutes(i as i64)).collect(),
            vec![date; n],
            settings(),
        );
        let opens: Vec<f64> = (0..n)
            .map(|i| {
                if dirs[i] > 0 {
                    closes[i] - 0.001
                } else {
                    closes[i] + 0.001
                }
            })
            .collect();
        table.push_dense_column("open", opens);
        table.push_dense_column("close", closes.to_vec());
        table.push_dense_column("reversal_size", vec![0.002; n]);
        table.push_dense_column("currentADR", vec![0.01; n]);
        table.push_dense_column(
            "direction",
            dirs.iter().map(|&d| d as f64).collect(),
        );
        table
    }

    fn config(target_type: TargetType, target_value: f64) -> BacktestConfig {
        BacktestConfig {
            stop_type: StopType::Rr,
            stop_value: 1.0,
            target_type,
            target_value,
            target_ma: 1,
            report_unit: ReportUnit::Rr,
            allow_overlap: true,
        }
    }

    fn entry_signal(expr: &str) -> Vec<SignalDef> {
        vec![SignalDef {
            name: "sig".to_string(),
            expression: expr.to_string(),
        }]
    }

    #[test]
    fn test_fixed_rr_target_hit() {
        // Entry at index 0 (close 1.2), target 1 RR = +0.002
        let table = table_from(&[1.2, 1.201, 1.2025], &[1, 1, 1]);
        let report = run_backtest(
            &table,
            &entry_signal("close == 1.2"),
            &config(TargetType::FixedRr, 1.0),
        )
        .unwrap();
        let result = &report.signals["sig"];
        assert_eq!(result.trades.len(), 1);
        let t = &result.trades[0];
        assert_eq!(t.outcome, TradeOutcome::Target);
        assert_eq!(t.result, 1.0);
        assert_eq!(t.exit_index, 2);
        assert_eq!(t.bars_held, 2);
    }

    #[test]
    fn test_stop_hit() {
        // Long entry, price collapses through the stop at 1.198
        let table = table_from(&[1.2, 1.199, 1.1975], &[1, -1, -1]);
        let report = run_backtest(
            &table,
            &entry_signal("close == 1.2"),
            &config(TargetType::FixedRr, 5.0),
        )
        .unwrap();
        let t = &report.signals["sig"].trades[0];
        assert_eq!(t.outcome, TradeOutcome::Stop);
        assert_eq!(t.result, -1.0);
        assert_eq!(t.exit_index, 2);
    }

    #[test]
    fn test_color_change_exit_beats_stop() {
        // Opposite-color bar closes at 1.1985, above the 1.1980 stop: the
        // color-change exit fires even though the move is negative
        let table = table_from(&[1.2, 1.1985], &[1, -1]);
        let report = run_backtest(
            &table,
            &entry_signal("close == 1.2"),
            &config(TargetType::ColorChange, 0.0),
        )
        .unwrap();
        let t = &report.signals["sig"].trades[0];
        assert_eq!(t.outcome, TradeOutcome::Target);
        assert_eq!(t.result, round2((1.1985 - 1.2) / 0.002));
        assert_eq!(t.result, -0.75);
    }

    #[test]
    fn test_open_outcome_at_series_end() {
        let table = table_from(&[1.2, 1.2005, 1.201], &[1, 1, 1]);
        let report = run_backtest(
            &table,
            &entry_signal("close == 1.2"),
            &config(TargetType::FixedRr, 5.0),
        )
        .unwrap();
        let t = &report.signals["sig"].trades[0];
        assert_eq!(t.outcome, TradeOutcome::Open);
        assert_eq!(t.exit_index, 2);
        // Unrealized: (1.201 - 1.2) / 0.002 = 0.5
        assert_eq!(t.result, 0.5);
        assert_eq!(report.signals["sig"].summary.open, 1);
    }

    #[test]
    fn test_short_side() {
        // Down entry at 1.2, fixed 1 RR target at 1.198
        let table = table_from(&[1.2, 1.199, 1.1979], &[-1, -1, -1]);
        let report = run_backtest(
            &table,
            &entry_signal("close == 1.2"),
            &config(TargetType::FixedRr, 1.0),
        )
        .unwrap();
        let t = &report.signals["sig"].trades[0];
        assert_eq!(t.direction, TradeDirection::Short);
        assert_eq!(t.outcome, TradeOutcome::Target);
        assert_eq!(t.result, 1.0);
    }

    #[test]
    fn test_ma_trail_exit() {
        let mut table = table_from(&[1.2, 1.2015, 1.2008, 1.1996], &[1, 1, -1, -1]);
        table.push_column(
            "EMA1_Price",
            vec![Some(1.1990), Some(1.1995), Some(1.2000), Some(1.2000)],
        );
        let mut cfg = config(TargetType::MaTrail, 0.0);
        cfg.stop_value = 5.0;
        let report = run_backtest(&table, &entry_signal("close == 1.2"), &cfg).unwrap();
        let t = &report.signals["sig"].trades[0];
        // Bar 2 is opposite color but closes above the EMA; bar 3 closes
        // below it and exits the long
        assert_eq!(t.exit_index, 3);
        assert_eq!(t.outcome, TradeOutcome::Target);
        assert_eq!(t.result, round2((1.1996 - 1.2) / 0.002));
    }

    #[test]
    fn test_serialized_mode_skips_overlapping_entries() {
        // Entries at 0, 1, 2; the first trade exits at index 2
        let closes = [1.2, 1.2005, 1.2025, 1.2045, 1.2065];
        let table = table_from(&closes, &[1, 1, 1, 1, 1]);
        let mut cfg = config(TargetType::FixedRr, 1.0);
        cfg.allow_overlap = false;
        let report = run_backtest(&table, &entry_signal("close >= 1.2"), &cfg).unwrap();
        let trades = &report.signals["sig"].trades;
        // Entry 0 exits at 2; entries 1 and 2 are skipped; entry 3 runs
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].entry_index, 0);
        assert_eq!(trades[0].exit_index, 2);
        assert_eq!(trades[1].entry_index, 3);
    }

    #[test]
    fn test_adr_stop_floored_at_reversal() {
        // 0.1 ADR = 0.001 would be under one reversal size; floor to 0.002
        let table = table_from(&[1.2, 1.1985, 1.2, 1.2], &[1, -1, 1, 1]);
        let cfg = BacktestConfig {
            stop_type: StopType::Adr,
            stop_value: 0.1,
            target_type: TargetType::FixedRr,
            target_value: 5.0,
            target_ma: 1,
            report_unit: ReportUnit::Rr,
            allow_overlap: true,
        };
        let report = run_backtest(&table, &entry_signal("close == 1.2 and direction == 1"), &cfg)
            .unwrap();
        let t = &report.signals["sig"].trades[0];
        // Stop at 1.2 - 0.002 = 1.198; bar 1 closes 1.1985, not stopped
        assert_ne!(t.entry_index, usize::MAX);
        assert_ne!(t.outcome, TradeOutcome::Stop);
    }

    #[test]
    fn test_summary_statistics() {
        // Two winners and one loser, all closed
        let closes = [1.2, 1.2025, 1.21, 1.2125, 1.22, 1.2175, 1.213];
        let dirs = [1, 1, 1, 1, 1, -1, -1];
        let table = table_from(&closes, &dirs);
        let report = run_backtest(
            &table,
            &entry_signal("close == 1.2 or close == 1.21 or close == 1.22"),
            &config(TargetType::FixedRr, 1.0),
        )
        .unwrap();
        let s = &report.signals["sig"].summary;
        assert_eq!(s.count, 3);
        assert_eq!(s.wins, 2);
        assert_eq!(s.losses, 1);
        assert_eq!(s.open, 0);
        assert_eq!(s.win_rate, round3(2.0 / 3.0));
        assert_eq!(s.avg_win, 1.0);
        assert_eq!(s.avg_loss, -1.0);
        assert_eq!(s.profit_factor, 2.0);
        assert_eq!(s.total_r, 1.0);
        assert_eq!(s.max_consec_wins, 2);
        assert_eq!(s.max_consec_losses, 1);
    }

    #[test]
    fn test_bad_signal_reported_not_fatal() {
        let table = table_from(&[1.2, 1.21], &[1, 1]);
        let signals = vec![
            SignalDef {
                name: "bad".to_string(),
                expression: "unknown_col > 0".to_string(),
            },
            SignalDef {
                name: "good".to_string(),
                expression: "close == 1.2".to_string(),
            },
        ];
        let report =
            run_backtest(&table, &signals, &config(TargetType::FixedRr, 1.0)).unwrap();
        assert!(report.errors.contains_key("bad"));
        assert!(report.signals.contains_key("good"));
        assert!(!report.signals.contains_key("bad"));
    }

    #[test]
    fn test_entry_on_last_bar_skipped() {
        let table = table_from(&[1.2, 1.21], &[1, 1]);
        let report = run_backtest(
            &table,
            &entry_signal("close == 1.21"),
            &config(TargetType::FixedRr, 1.0),
        )
        .unwrap();
        assert_eq!(report.signals["sig"].summary.count, 0);
    }

    #[test]
    fn test_invalid_config() {
        let cfg = BacktestConfig {
            stop_type: StopType::Rr,
            stop_value: -1.0,
            target_type: TargetType::ColorChange,
            target_value: 0.0,
            target_ma: 1,
            report_unit: ReportUnit::Rr,
            allow_overlap: true,
        };
        assert!(matches!(cfg.validate(), Err(RenkoError::InvalidConfig(_))));

        let cfg = BacktestConfig {
            stop_type: StopType::Rr,
            stop_value: 1.0,
            target_type: TargetType::MaTrail,
            target_value: 0.0,
            target_ma: 5,
            report_unit: ReportUnit::Rr,
            allow_overlap: true,
        };
        assert!(matches!(cfg.validate(), Err(RenkoError::InvalidConfig(_))));
    }
}
