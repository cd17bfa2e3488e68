//! Correlation metrics over prediction tables.
//!
//! Coefficients are `None` when undefined: fewer than two finite pairs or a
//! constant input. Per-target statistics only consider targets with at least
//! [`MIN_TARGET_SIZE`] structures.
use cgnn_io::Prediction;
use itertools::Itertools;
use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

/// Targets with fewer structures carry no meaningful ranking.
pub const MIN_TARGET_SIZE: usize = 3;

fn finite_pairs(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip()
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let (x, y) = finite_pairs(x, y);
    let n = x.len();
    if n < 2 {
        return None;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(&y) {
        let (da, db) = (a - mx, b - my);
        sxy += da * db;
        sxx += da * da;
        syy += db * db;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// 1-based ranks, ties share their average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let order = (0..values.len())
        .sorted_by(|&a, &b| cmp_f64(values[a], values[b]))
        .collect::<Vec<_>>();
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    let (x, y) = finite_pairs(x, y);
    pearson(&average_ranks(&x), &average_ranks(&y))
}

/// Kendall's tau-b, which corrects for ties in either variable.
///
/// Knight's algorithm: order the pairs by `(x, y)`, then the discordant pairs are
/// the inversions a merge sort of the reordered `y` has to undo.
pub fn kendall(x: &[f64], y: &[f64]) -> Option<f64> {
    let (x, y) = finite_pairs(x, y);
    let n = x.len();
    if n < 2 {
        return None;
    }
    let order = (0..n)
        .sorted_by(|&a, &b| cmp_f64(x[a], x[b]).then(cmp_f64(y[a], y[b])))
        .collect::<Vec<_>>();
    let ties_x = tied_pairs(order.iter().map(|&i| x[i]));
    let ties_xy = tied_pairs(order.iter().map(|&i| (x[i], y[i])));
    let mut ys = order.iter().map(|&i| y[i]).collect::<Vec<_>>();
    let mut buffer = vec![0.0; n];
    let swaps = sort_counting_inversions(&mut ys, &mut buffer);
    let ties_y = tied_pairs(ys.iter().copied());

    let total = n as u64 * (n as u64 - 1) / 2;
    let denom = ((total - ties_x) as f64 * (total - ties_y) as f64).sqrt();
    if denom == 0.0 {
        return None;
    }
    let score = total as f64 - ties_x as f64 - ties_y as f64 + ties_xy as f64 - 2.0 * swaps as f64;
    Some((score / denom).clamp(-1.0, 1.0))
}

// Inputs are finite, so the partial order is total; -0.0 and 0.0 compare equal.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Pairs inside runs of equal, adjacent values.
fn tied_pairs<T: PartialEq>(values: impl Iterator<Item = T>) -> u64 {
    values
        .dedup_with_count()
        .map(|(run, _)| run as u64 * (run as u64 - 1) / 2)
        .sum()
}

/// Stable merge sort of `values`, returning the number of strictly inverted pairs.
/// `buffer` must have the same length as `values`.
fn sort_counting_inversions(values: &mut [f64], buffer: &mut [f64]) -> u64 {
    let n = values.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut swaps = {
        let (left, right) = values.split_at_mut(mid);
        let (buf_left, buf_right) = buffer.split_at_mut(mid);
        sort_counting_inversions(left, buf_left) + sort_counting_inversions(right, buf_right)
    };
    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < n {
        if values[j] < values[i] {
            buffer[k] = values[j];
            j += 1;
            swaps += (mid - i) as u64;
        } else {
            buffer[k] = values[i];
            i += 1;
        }
        k += 1;
    }
    buffer[k..k + mid - i].copy_from_slice(&values[i..mid]);
    k += mid - i;
    buffer[k..].copy_from_slice(&values[j..]);
    values.copy_from_slice(buffer);
    swaps
}

fn mean(values: &[Option<f64>]) -> Option<f64> {
    let present = values.iter().flatten().collect::<Vec<_>>();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().copied().sum::<f64>() / present.len() as f64)
}

fn median(values: &[Option<f64>]) -> Option<f64> {
    let present = values
        .iter()
        .flatten()
        .copied()
        .sorted_by(f64::total_cmp)
        .collect::<Vec<_>>();
    let n = present.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(present[n / 2]),
        _ => Some((present[n / 2 - 1] + present[n / 2]) / 2.0),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coefficients {
    pub pearson: Option<f64>,
    pub kendall: Option<f64>,
    pub spearman: Option<f64>,
}

impl Coefficients {
    pub fn compute(x: &[f64], y: &[f64]) -> Self {
        Self {
            pearson: pearson(x, y),
            kendall: kendall(x, y),
            spearman: spearman(x, y),
        }
    }
}

/// Global and per-target correlations between true and predicted values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationReport {
    pub all: Coefficients,
    pub per_target_mean: Coefficients,
    pub per_target_median: Coefficients,
    /// Targets that entered the per-target statistics.
    pub num_targets: usize,
}

impl CorrelationReport {
    pub fn compute(predictions: &[Prediction]) -> Self {
        let truth = predictions.iter().map(|p| p.truth).collect::<Vec<_>>();
        let pred = predictions.iter().map(|p| p.pred).collect::<Vec<_>>();
        let all = Coefficients::compute(&truth, &pred);

        let per_target = predictions
            .iter()
            .into_group_map_by(|p| p.target.as_str())
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .filter(|(_, rows)| rows.len() >= MIN_TARGET_SIZE)
            .map(|(_, rows)| {
                let truth = rows.iter().map(|p| p.truth).collect::<Vec<_>>();
                let pred = rows.iter().map(|p| p.pred).collect::<Vec<_>>();
                Coefficients::compute(&truth, &pred)
            })
            .collect::<Vec<_>>();

        let reduce = |f: fn(&[Option<f64>]) -> Option<f64>| Coefficients {
            pearson: f(&per_target.iter().map(|c| c.pearson).collect::<Vec<_>>()),
            kendall: f(&per_target.iter().map(|c| c.kendall).collect::<Vec<_>>()),
            spearman: f(&per_target.iter().map(|c| c.spearman).collect::<Vec<_>>()),
        };
        let report = Self {
            all,
            per_target_mean: reduce(mean),
            per_target_median: reduce(median),
            num_targets: per_target.len(),
        };
        for (key, value) in report.entries() {
            if value.is_none() {
                warn!("{key} is undefined for {} predictions", predictions.len());
            }
        }
        report
    }

    /// Named entries in a fixed order.
    pub fn entries(&self) -> [(&'static str, Option<f64>); 9] {
        [
            ("all_pearson", self.all.pearson),
            ("all_kendall", self.all.kendall),
            ("all_spearman", self.all.spearman),
            ("per_target_mean_pearson", self.per_target_mean.pearson),
            ("per_target_mean_kendall", self.per_target_mean.kendall),
            ("per_target_mean_spearman", self.per_target_mean.spearman),
            ("per_target_median_pearson", self.per_target_median.pearson),
            ("per_target_median_kendall", self.per_target_median.kendall),
            ("per_target_median_spearman", self.per_target_median.spearman),
        ]
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries()
            .into_iter()
            .find(|(name, _)| *name == key)
            .and_then(|(_, value)| value)
    }
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "nan".to_string(), |v| format!("{v:.3}"))
}

fn fmt_triple(c: &Coefficients) -> String {
    format!(
        "({}, {}, {})",
        fmt_value(c.pearson),
        fmt_value(c.kendall),
        fmt_value(c.spearman)
    )
}

impl fmt::Display for CorrelationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Correlations (Pearson, Kendall, Spearman)")?;
        writeln!(
            f,
            "    per-target averaged median: {}",
            fmt_triple(&self.per_target_median)
        )?;
        writeln!(
            f,
            "    per-target averaged mean: {}",
            fmt_triple(&self.per_target_mean)
        )?;
        write!(f, "    all averaged: {}", fmt_triple(&self.all))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_perfect_linear() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = x.map(|v| 2.0 * v + 1.0);
        assert!(close(pearson(&x, &y), 1.0));
        assert!(close(spearman(&x, &y), 1.0));
        assert!(close(kendall(&x, &y), 1.0));
        let z = x.map(|v| -v);
        assert!(close(kendall(&x, &z), -1.0));
    }

    #[test]
    fn test_known_values() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 3.0, 2.0, 4.0];
        // one discordant pair out of six
        assert!(close(kendall(&x, &y), 4.0 / 6.0));
        // d^2 = 0 + 1 + 1 + 0
        assert!(close(spearman(&x, &y), 1.0 - 6.0 * 2.0 / (4.0 * 15.0)));
        assert!(close(pearson(&x, &y), 0.8));
    }

    #[test]
    fn test_ties() {
        assert_eq!(average_ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
        // tau-b on x = [1, 2, 2], y = [1, 2, 3]
        let tau = kendall(&[1.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((tau - 2.0 / (2f64 * 3.0).sqrt()).abs() < 1e-9);
    }

    fn kendall_pairwise(x: &[f64], y: &[f64]) -> f64 {
        let n = x.len();
        let (mut score, mut ties_x, mut ties_y) = (0i64, 0i64, 0i64);
        for i in 0..n {
            for j in (i + 1)..n {
                let (dx, dy) = (x[i] - x[j], y[i] - y[j]);
                ties_x += (dx == 0.0) as i64;
                ties_y += (dy == 0.0) as i64;
                score += (dx.signum() * dy.signum()) as i64 * (dx != 0.0 && dy != 0.0) as i64;
            }
        }
        let total = (n * (n - 1) / 2) as i64;
        score as f64 / (((total - ties_x) * (total - ties_y)) as f64).sqrt()
    }

    #[test]
    fn test_kendall_matches_pairwise_count_with_ties() {
        let x = (0..60).map(|i| ((i * 7) % 11) as f64).collect::<Vec<_>>();
        let y = (0..60).map(|i| ((i * 5) % 13) as f64 - 0.5 * (i % 3) as f64).collect::<Vec<_>>();
        let tau = kendall(&x, &y).unwrap();
        assert!((tau - kendall_pairwise(&x, &y)).abs() < 1e-12, "{tau}");
        // signed zeros are one tie group
        let expected = kendall_pairwise(&[0.0, 0.0, 1.0], &[2.0, 1.0, 3.0]);
        assert!(close(kendall(&[0.0, -0.0, 1.0], &[2.0, 1.0, 3.0]), expected));
    }

    #[test]
    fn test_kendall_large_input() {
        let x = (0..80_000).map(f64::from).collect::<Vec<_>>();
        let reversed = x.iter().rev().copied().collect::<Vec<_>>();
        assert!(close(kendall(&x, &x), 1.0));
        assert!(close(kendall(&x, &reversed), -1.0));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(pearson(&[1.0], &[2.0]), None);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(spearman(&[2.0, 2.0], &[1.0, 2.0]), None);
        assert_eq!(kendall(&[2.0, 2.0], &[1.0, 2.0]), None);
        // non-finite pairs are dropped
        assert!(close(pearson(&[1.0, f64::NAN, 2.0, 3.0], &[1.0, 5.0, 2.0, 3.0]), 1.0));
    }

    fn table(rows: &[(&str, f64, f64)]) -> Vec<Prediction> {
        rows.iter()
            .map(|(name, t, p)| Prediction::new(*name, *t, *p))
            .collect()
    }

    #[test]
    fn test_report_groups() {
        let rows = table(&[
            ("A/1.pdb", 1.0, 1.0),
            ("A/2.pdb", 2.0, 2.0),
            ("A/3.pdb", 3.0, 3.0),
            ("B/1.pdb", 1.0, 3.0),
            ("B/2.pdb", 2.0, 2.0),
            ("B/3.pdb", 3.0, 1.0),
            // two decoys only, ignored per target
            ("C/1.pdb", 1.0, 5.0),
            ("C/2.pdb", 2.0, 0.0),
        ]);
        let report = CorrelationReport::compute(&rows);
        assert_eq!(report.num_targets, 2);
        assert!(close(report.per_target_mean.spearman, 0.0));
        assert!(close(report.per_target_median.pearson, 0.0));
        assert!(report.all.spearman.is_some());
        assert_eq!(report.get("per_target_mean_kendall"), report.per_target_mean.kendall);
        assert_eq!(report.entries().len(), 9);
    }

    #[test]
    fn test_report_without_groups() {
        let rows = table(&[("c1", 1.0, 1.5), ("c2", 2.0, 2.5), ("c3", 3.0, 2.0)]);
        let report = CorrelationReport::compute(&rows);
        assert_eq!(report.num_targets, 0);
        assert_eq!(report.per_target_mean, Coefficients::default());
        assert_eq!(report.per_target_median.spearman, None);
        assert!(report.all.pearson.is_some());
        assert!(report.to_string().contains("per-target averaged mean: (nan, nan, nan)"));
    }

    #[test]
    fn test_median_skips_missing() {
        assert_eq!(median(&[Some(3.0), None, Some(1.0), Some(2.0)]), Some(2.0));
        assert_eq!(median(&[Some(1.0), Some(4.0)]), Some(2.5));
        assert_eq!(mean(&[None, Some(1.0), Some(2.0)]), Some(1.5));
        assert_eq!(mean(&[None]), None);
    }
}
