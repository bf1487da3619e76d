use std::collections::BTreeMap;

use log::debug;
use rust_decimal::{Decimal, MathematicalOps};

use crate::types::{MonthTotal, ReportConfig, Transaction, TxReport};

/// Sums the magnitudes of the debits in `transactions`. Credits are skipped, not subtracted.
///
/// A collection without any debits totals zero. A total past [`Decimal::MAX`] saturates there.
pub fn debit_total<'a, I>(transactions: I) -> Decimal
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .filter(|tx| tx.is_debit())
        .fold(Decimal::ZERO, |sum, tx| sum.saturating_add(tx.amount.abs()))
}

/// Groups transactions by their `YYYY-MM` key and totals each month's debits.
///
/// Months come back in ascending key order.
pub fn month_totals(transactions: &[Transaction]) -> Vec<MonthTotal> {
    let mut by_month: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions {
        by_month.entry(tx.year_month()).or_default().push(tx);
    }
    by_month
        .into_iter()
        .map(|(year_month, txs)| MonthTotal {
            year_month,
            total: debit_total(txs),
        })
        .collect()
}

/// Arithmetic mean, or zero for an empty slice.
///
/// If the plain sum overflows, each value is divided by the count before summing instead.
fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let count = Decimal::from(values.len());
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |sum, v| sum.checked_add(*v));
    match sum {
        Some(sum) => sum / count,
        None => values
            .iter()
            .fold(Decimal::ZERO, |sum, v| sum.saturating_add(v / count)),
    }
}

/// Population standard deviation (divides by N) around a precomputed mean.
///
/// Deviations are divided by the largest one before squaring, so the squares stay within one
/// and cannot overflow however large the totals are.
fn population_std_dev(values: &[Decimal], mean: Decimal) -> Decimal {
    let scale = values
        .iter()
        .map(|v| v.saturating_sub(mean).abs())
        .max()
        .unwrap_or(Decimal::ZERO);
    if scale.is_zero() {
        return Decimal::ZERO;
    }
    let squares = values.iter().fold(Decimal::ZERO, |sum, v| {
        let ratio = v.saturating_sub(mean) / scale;
        sum + ratio * ratio
    });
    let root = (squares / Decimal::from(values.len()))
        .sqrt()
        .unwrap_or(Decimal::ZERO);
    scale.saturating_mul(root)
}

/// Keeps only the months whose total is within `threshold` population standard deviations of the
/// mean of all months.
///
/// When every total is equal (including the single-month case) the deviation is zero and every
/// month is kept.
pub fn filter_outliers(months: Vec<MonthTotal>, threshold: Decimal) -> Vec<MonthTotal> {
    let totals: Vec<Decimal> = months.iter().map(|m| m.total).collect();
    let mean = mean(&totals);
    let std_dev = population_std_dev(&totals, mean);
    let limit = threshold.saturating_mul(std_dev);
    debug!("month totals: mean {mean}, std dev {std_dev}, limit {limit}");
    months
        .into_iter()
        .filter(|m| {
            let keep = m.total.saturating_sub(mean).abs() <= limit;
            if !keep {
                debug!("dropping outlier month {m}");
            }
            keep
        })
        .collect()
}

/// Builds a [`TxReport`] with the default [`ReportConfig`].
pub fn mk_tx_report(transactions: &[Transaction]) -> TxReport {
    mk_tx_report_with(transactions, &ReportConfig::default())
}

/// Builds a [`TxReport`] from `transactions`.
///
/// The caller's slice is left in its original order. Largest debits are ranked over every
/// transaction; the monthly figures only cover months that survive outlier filtering. With no
/// surviving months the average is zero and both extremes are `None`.
pub fn mk_tx_report_with(transactions: &[Transaction], config: &ReportConfig) -> TxReport {
    let mut ranked: Vec<&Transaction> = transactions.iter().collect();
    // stable, so equal amounts keep their incoming order
    ranked.sort_by_key(|tx| tx.amount);
    let max_debits: Vec<Transaction> = ranked
        .into_iter()
        .take(config.max_debit_count)
        .cloned()
        .collect();

    let all_months = month_totals(transactions);
    let month_count = all_months.len();
    let mut month_totals = filter_outliers(all_months, config.outlier_threshold);
    month_totals.sort_by(|a, b| a.year_month.cmp(&b.year_month));
    debug!(
        "{} of {} months kept for the report",
        month_totals.len(),
        month_count
    );

    let totals: Vec<Decimal> = month_totals.iter().map(|m| m.total).collect();
    let monthly_average = mean(&totals);

    let max_month = month_totals
        .iter()
        .reduce(|best, m| if m.total > best.total { m } else { best });
    let min_month = month_totals
        .iter()
        .reduce(|best, m| if m.total < best.total { m } else { best });

    TxReport {
        max_month: max_month.map(|m| m.year_month.clone()),
        max_month_amount: max_month.map_or(Decimal::ZERO, |m| m.total),
        min_month: min_month.map(|m| m.year_month.clone()),
        min_month_amount: min_month.map_or(Decimal::ZERO, |m| m.total),
        month_totals,
        max_debits,
        monthly_average,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn tx(date: &str, amount: Decimal) -> Transaction {
        Transaction::new(date, "DEBIT", "PAYEE", None, amount)
    }

    fn named(date: &str, name: &str, amount: Decimal) -> Transaction {
        Transaction::new(date, "DEBIT", name, None, amount)
    }

    fn month(year_month: &str, total: Decimal) -> MonthTotal {
        MonthTotal {
            year_month: year_month.to_string(),
            total,
        }
    }

    /// Five ordinary months and a 10000 spike in March
    fn spiky_year() -> Vec<Transaction> {
        vec![
            tx("2023-01-03", dec!(-100)),
            tx("2023-01-19", dec!(-50)),
            tx("2023-02-11", dec!(-120)),
            tx("2023-03-02", dec!(-10000)),
            tx("2023-04-15", dec!(-80)),
            tx("2023-05-07", dec!(-130)),
            tx("2023-06-21", dec!(-110)),
            tx("2023-06-30", dec!(2500)),
        ]
    }

    #[test]
    fn test_debit_total_ignores_credits() {
        let txs = vec![
            tx("2023-05-01", dec!(-20)),
            tx("2023-05-02", dec!(-30)),
            tx("2023-05-03", dec!(15)),
        ];
        assert_eq!(debit_total(&txs), dec!(50));
    }

    #[test]
    fn test_debit_total_without_debits_is_zero() {
        assert_eq!(debit_total(&[tx("2023-06-01", dec!(100))]), dec!(0));
        assert_eq!(debit_total(&Vec::<Transaction>::new()), dec!(0));
    }

    #[test]
    fn test_month_totals_groups_by_month() {
        let txs = vec![
            tx("2023-02-10", dec!(-10.25)),
            tx("2023-01-31", dec!(-4.75)),
            tx("2023-02-01", dec!(-0.75)),
            tx("2023-01-01", dec!(99)),
        ];
        assert_eq!(
            month_totals(&txs),
            vec![month("2023-01", dec!(4.75)), month("2023-02", dec!(11.00))]
        );
    }

    #[test]
    fn test_month_totals_accepts_malformed_dates() {
        let txs = vec![tx("2023", dec!(-1)), tx("garbage-in", dec!(-2)), tx("2023", dec!(-3))];
        assert_eq!(
            month_totals(&txs),
            vec![month("2023", dec!(4)), month("garbage", dec!(2))]
        );
    }

    #[test]
    fn test_filter_outliers_drops_spike() {
        let months = vec![
            month("2023-01", dec!(100)),
            month("2023-02", dec!(100)),
            month("2023-03", dec!(100)),
            month("2023-04", dec!(10000)),
            month("2023-05", dec!(100)),
            month("2023-06", dec!(100)),
        ];
        let kept = filter_outliers(months, dec!(2));
        assert_eq!(kept.len(), 5);
        assert!(kept.iter().all(|m| m.year_month != "2023-04"));
    }

    #[test]
    fn test_filter_outliers_identical_totals() {
        let months = vec![
            month("2023-01", dec!(33.33)),
            month("2023-02", dec!(33.33)),
            month("2023-03", dec!(33.33)),
        ];
        assert_eq!(filter_outliers(months.clone(), dec!(2)), months);
    }

    #[test]
    fn test_filter_outliers_single_month() {
        let months = vec![month("2023-01", dec!(1234.56))];
        assert_eq!(filter_outliers(months.clone(), dec!(2)), months);
    }

    #[test]
    fn test_filter_outliers_empty() {
        assert!(filter_outliers(vec![], dec!(2)).is_empty());
    }

    #[test]
    fn test_population_std_dev() {
        let values = [dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)];
        let mean = mean(&values);
        assert_eq!(mean, dec!(5));
        let std_dev = population_std_dev(&values, mean);
        assert!((std_dev - dec!(2)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_statistics_on_huge_totals() {
        let values = [dec!(0), dec!(70000000000000000000000000000)];
        let mean = mean(&values);
        assert_eq!(mean, dec!(35000000000000000000000000000));
        let std_dev = population_std_dev(&values, mean);
        assert!((std_dev - dec!(35000000000000000000000000000)).abs() < dec!(1000));

        // the plain sum overflows here
        let values = [dec!(70000000000000000000000000000), dec!(70000000000000000000000000000)];
        assert_eq!(super::mean(&values), dec!(70000000000000000000000000000));
    }

    #[test]
    fn test_debit_total_saturates() {
        let txs = vec![
            tx("2023-01-01", dec!(-50000000000000000000000000)),
            Transaction {
                amount: Decimal::MIN,
                ..tx("2023-01-02", dec!(0))
            },
        ];
        assert_eq!(debit_total(&txs), Decimal::MAX);
    }

    #[test]
    fn test_report_on_huge_amounts() {
        let txs = vec![
            tx("2023-01-01", dec!(-1000000000000000)),
            tx("2023-02-01", dec!(1)),
        ];
        let report = mk_tx_report(&txs);
        assert_eq!(
            report.month_totals,
            vec![month("2023-01", dec!(1000000000000000)), month("2023-02", dec!(0))]
        );
        assert_eq!(report.monthly_average, dec!(500000000000000));
        assert_eq!(report.max_month.as_deref(), Some("2023-01"));

        let txs = vec![
            tx("2023-01-01", dec!(-50000000000000000000000000)),
            tx("2023-02-01", dec!(-70000000000000000000000000)),
            tx("2023-03-01", dec!(-60000000000000000000000000)),
        ];
        let report = mk_tx_report(&txs);
        assert_eq!(report.month_totals.len(), 3);
        assert_eq!(report.monthly_average, dec!(60000000000000000000000000));
        assert_eq!(report.min_month.as_deref(), Some("2023-01"));
    }

    #[test]
    fn test_report_single_month() {
        let txs = vec![
            tx("2023-05-01", dec!(-20)),
            tx("2023-05-12", dec!(-30)),
            tx("2023-05-28", dec!(15)),
        ];
        let report = mk_tx_report(&txs);
        assert_eq!(report.month_totals, vec![month("2023-05", dec!(50))]);
        assert_eq!(report.monthly_average, dec!(50));
        assert_eq!(report.max_month.as_deref(), Some("2023-05"));
        assert_eq!(report.min_month.as_deref(), Some("2023-05"));
        assert_eq!(report.max_month_amount, dec!(50));
        assert_eq!(report.min_month_amount, dec!(50));
        let amounts: Vec<Decimal> = report.max_debits.iter().map(|t| t.amount()).collect();
        assert_eq!(amounts, vec![dec!(-30), dec!(-20), dec!(15)]);
    }

    #[test]
    fn test_report_month_without_debits() {
        let report = mk_tx_report(&[tx("2023-06-14", dec!(100))]);
        assert_eq!(report.month_totals, vec![month("2023-06", dec!(0))]);
        assert_eq!(report.monthly_average, dec!(0));
        assert_eq!(report.max_month.as_deref(), Some("2023-06"));
        assert_eq!(report.max_month_amount, dec!(0));
        assert_eq!(report.max_debits.len(), 1);
    }

    #[test]
    fn test_report_empty_input() {
        let report = mk_tx_report(&[]);
        assert!(report.month_totals.is_empty());
        assert!(report.max_debits.is_empty());
        assert_eq!(report.monthly_average, dec!(0));
        assert_eq!(report.max_month, None);
        assert_eq!(report.min_month, None);
        assert_eq!(report.max_month_amount, dec!(0));
        assert_eq!(report.min_month_amount, dec!(0));
    }

    #[test]
    fn test_report_excludes_outlier_month_but_keeps_its_debit() {
        let report = mk_tx_report(&spiky_year());
        assert_eq!(
            report.month_totals,
            vec![
                month("2023-01", dec!(150)),
                month("2023-02", dec!(120)),
                month("2023-04", dec!(80)),
                month("2023-05", dec!(130)),
                month("2023-06", dec!(110)),
            ]
        );
        assert_eq!(report.monthly_average, dec!(118));
        assert_eq!(report.max_month.as_deref(), Some("2023-01"));
        assert_eq!(report.max_month_amount, dec!(150));
        assert_eq!(report.min_month.as_deref(), Some("2023-04"));
        assert_eq!(report.min_month_amount, dec!(80));
        // ranking runs over the raw list, so the dropped month still shows up here
        let amounts: Vec<Decimal> = report.max_debits.iter().map(|t| t.amount()).collect();
        assert_eq!(amounts, vec![dec!(-10000), dec!(-130), dec!(-120)]);
    }

    #[test]
    fn test_three_months_never_exceed_two_deviations() {
        // With N months no total can be more than sqrt(N - 1) deviations out, so the spike stays
        let txs = vec![
            tx("2023-01-05", dec!(-100)),
            tx("2023-01-06", dec!(-50)),
            tx("2023-02-07", dec!(-10000)),
            tx("2023-03-08", dec!(-80)),
        ];
        let report = mk_tx_report(&txs);
        let keys: Vec<&str> = report
            .month_totals
            .iter()
            .map(|m| m.year_month.as_str())
            .collect();
        assert_eq!(keys, vec!["2023-01", "2023-02", "2023-03"]);
        assert_eq!(report.max_debits[0].amount(), dec!(-10000));

        let tight = ReportConfig {
            outlier_threshold: dec!(1),
            ..ReportConfig::default()
        };
        let report = mk_tx_report_with(&txs, &tight);
        assert_eq!(
            report.month_totals,
            vec![month("2023-01", dec!(150)), month("2023-03", dec!(80))]
        );
        assert_eq!(report.monthly_average, dec!(115));
        assert_eq!(report.max_debits[0].amount(), dec!(-10000));
    }

    #[test]
    fn test_outlier_months_absent() {
        let txs = spiky_year();
        let all = month_totals(&txs);
        let totals: Vec<Decimal> = all.iter().map(|m| m.total).collect();
        let mean = mean(&totals);
        let limit = dec!(2) * population_std_dev(&totals, mean);
        let report = mk_tx_report(&txs);
        for m in &all {
            let present = report.month_totals.iter().any(|r| r.year_month == m.year_month);
            assert_eq!(present, (m.total - mean).abs() <= limit, "month {m}");
        }
    }

    #[test]
    fn test_totals_match_surviving_debits() {
        let txs = spiky_year();
        let report = mk_tx_report(&txs);
        let reported = report
            .month_totals
            .iter()
            .fold(Decimal::ZERO, |sum, m| sum + m.total);
        let expected = debit_total(txs.iter().filter(|t| {
            report
                .month_totals
                .iter()
                .any(|m| m.year_month == t.year_month())
        }));
        assert_eq!(reported, expected);
    }

    #[test]
    fn test_month_totals_strictly_ascending() {
        let mut txs = spiky_year();
        txs.reverse();
        let report = mk_tx_report(&txs);
        assert!(report
            .month_totals
            .windows(2)
            .all(|w| w[0].year_month < w[1].year_month));
    }

    #[test]
    fn test_max_debits_ties_keep_input_order() {
        let txs = vec![
            named("2023-01-01", "FIRST", dec!(-50)),
            named("2023-01-02", "CHEAP", dec!(-5)),
            named("2023-01-03", "SECOND", dec!(-50)),
            named("2023-01-04", "THIRD", dec!(-50)),
            named("2023-01-05", "FOURTH", dec!(-50)),
        ];
        let report = mk_tx_report(&txs);
        let names: Vec<&str> = report.max_debits.iter().map(|t| t.payee_name()).collect();
        assert_eq!(names, vec!["FIRST", "SECOND", "THIRD"]);
    }

    #[test]
    fn test_max_debits_are_the_lowest_amounts() {
        let txs = spiky_year();
        let report = mk_tx_report(&txs);
        assert_eq!(report.max_debits.len(), 3);
        let worst_kept = report.max_debits.iter().map(|t| t.amount()).max().unwrap();
        assert!(txs
            .iter()
            .filter(|t| !report.max_debits.contains(t))
            .all(|t| t.amount() >= worst_kept));
    }

    #[test]
    fn test_month_extremes_first_wins_on_ties() {
        let txs = vec![
            tx("2023-02-01", dec!(-50)),
            tx("2023-01-01", dec!(-50)),
            tx("2023-03-01", dec!(-50)),
        ];
        let report = mk_tx_report(&txs);
        assert_eq!(report.max_month.as_deref(), Some("2023-01"));
        assert_eq!(report.min_month.as_deref(), Some("2023-01"));
    }

    #[test]
    fn test_report_leaves_input_alone_and_is_repeatable() {
        let txs = spiky_year();
        let before = txs.clone();
        let first = mk_tx_report(&txs);
        let second = mk_tx_report(&txs);
        assert_eq!(txs, before);
        assert_eq!(first, second);
    }
}
