//! Population Stability Index over quantile bins of the reference sample.
//!
//! Bins are cut at the reference quantiles, so under no drift every bin holds
//! roughly the same share of both samples. Each proportion is floored at
//! `epsilon` before `Σ (p_ref - p_cur) · ln(p_ref / p_cur)` is taken.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};

use serde::Serialize;
use thiserror::Error;

use crate::monitor::sample::NumericSample;

pub const DEFAULT_BINS: usize = 10;
pub const DEFAULT_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsiConfig {
    pub bins: usize,
    pub epsilon: f64,
}

impl Default for PsiConfig {
    fn default() -> Self {
        PsiConfig {
            bins: DEFAULT_BINS,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantileError {
    #[error("at least two data points are required, found {0}")]
    TooFewPoints(usize),
    #[error("the data is constant")]
    Constant,
    #[error("the number of partitions must be at least one")]
    NoPartitions,
}

/// Why a score defaulted to zero instead of being computed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    #[error("reference has {found} observations, {required} required")]
    TooFewReference { required: usize, found: usize },
    #[error("current sample is empty")]
    EmptyCurrent,
    #[error("reference quantiles unavailable: {0}")]
    Quantiles(#[from] QuantileError),
}

/// PSI of one feature: a computed value, or a no-signal default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PsiScore {
    Computed(f64),
    Insufficient(Degeneracy),
}

impl PsiScore {
    /// Numeric score; insufficient evidence counts as no drift.
    pub fn value(&self) -> f64 {
        match self {
            PsiScore::Computed(value) => *value,
            PsiScore::Insufficient(_) => 0.0,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, PsiScore::Computed(_))
    }
}

/// `n - 1` cut points dividing `data` into `n` groups, using the exclusive
/// method (positions interpolated over `len + 1`).
pub fn exclusive_quantiles(data: &[f64], n: usize) -> Result<Vec<f64>, QuantileError> {
    if n < 1 {
        return Err(QuantileError::NoPartitions);
    }
    let len = data.len();
    if len < 2 {
        return Err(QuantileError::TooFewPoints(len));
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    if sorted[0] == sorted[len - 1] {
        return Err(QuantileError::Constant);
    }

    let m = len + 1;
    let cuts = (1..n)
        .map(|i| {
            let j = (i * m / n).max(1).min(len - 1);
            // i*m - j*n may go negative once j is clamped at the upper end.
            let delta = (i * m) as f64 - (j * n) as f64;
            (sorted[j - 1] * (n as f64 - delta) + sorted[j] * delta) / n as f64
        })
        .collect();
    Ok(cuts)
}

fn bin_index(bounds: &[f64], value: f64, bins: usize) -> usize {
    let index = bounds.partition_point(|bound| *bound <= value).saturating_sub(1);
    index.min(bins - 1)
}

fn proportions(values: &[f64], bounds: &[f64], bins: usize) -> Vec<f64> {
    let mut counts = vec![0usize; bins];
    for &value in values {
        counts[bin_index(bounds, value, bins)] += 1;
    }
    let total = counts.iter().sum::<usize>() as f64;
    let total = if total == 0.0 { 1.0 } else { total };
    counts.into_iter().map(|count| count as f64 / total).collect()
}

/// Scores `current` against `reference`, reporting degenerate inputs explicitly.
pub fn score(reference: &[f64], current: &[f64], config: PsiConfig) -> PsiScore {
    let bins = config.bins;
    let required = bins + 1;
    if reference.len() < required {
        return PsiScore::Insufficient(Degeneracy::TooFewReference {
            required,
            found: reference.len(),
        });
    }
    if current.is_empty() {
        return PsiScore::Insufficient(Degeneracy::EmptyCurrent);
    }
    let cuts = match exclusive_quantiles(reference, bins) {
        Ok(cuts) => cuts,
        Err(error) => return PsiScore::Insufficient(error.into()),
    };

    let mut bounds = Vec::with_capacity(bins + 1);
    bounds.push(f64::NEG_INFINITY);
    bounds.extend(cuts);
    bounds.push(f64::INFINITY);

    let reference_pct = proportions(reference, &bounds, bins);
    let current_pct = proportions(current, &bounds, bins);

    let value = reference_pct
        .iter()
        .zip(current_pct.iter())
        .map(|(&r, &c)| {
            let r = r.max(config.epsilon);
            let c = c.max(config.epsilon);
            (r - c) * (r / c).ln()
        })
        .sum();
    PsiScore::Computed(value)
}

/// PSI with insufficient evidence collapsed to `0.0`.
pub fn psi(reference: &[f64], current: &[f64], bins: usize, epsilon: f64) -> f64 {
    score(reference, current, PsiConfig { bins, epsilon }).value()
}

/// Per-feature PSI and their mean.
///
/// `aggregate` is `0.0` when `feature_count` is zero; that state means no
/// signal, not an absence of drift.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PsiResult {
    pub per_feature: BTreeMap<String, f64>,
    pub aggregate: f64,
    pub feature_count: usize,
    /// Features whose score defaulted to zero for lack of evidence.
    pub insufficient: BTreeSet<String>,
}

impl PsiResult {
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (String, PsiScore)>,
    {
        let mut result = PsiResult::default();
        for (feature, score) in scores {
            if !score.is_computed() {
                result.insufficient.insert(feature.clone());
            }
            result.per_feature.insert(feature, score.value());
        }
        result.feature_count = result.per_feature.len();
        if result.feature_count > 0 {
            result.aggregate = result.per_feature.values().sum::<f64>() / result.feature_count as f64;
        }
        result
    }

    pub fn has_signal(&self) -> bool {
        self.feature_count > 0
    }

    /// Features ordered by descending score.
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .per_feature
            .iter()
            .map(|(feature, value)| (feature.as_str(), *value))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
    }
}

/// Scores every feature in `features` for which both sides hold observations.
pub fn compare_features<S: AsRef<str>>(
    reference: &BTreeMap<String, NumericSample>,
    current: &BTreeMap<String, NumericSample>,
    features: &[S],
    config: PsiConfig,
) -> PsiResult {
    let scores = features.iter().filter_map(|feature| {
        let feature = feature.as_ref();
        let base = reference.get(feature).filter(|sample| !sample.is_empty())?;
        let cur = current.get(feature).filter(|sample| !sample.is_empty())?;
        Some((feature.to_string(), score(&base.values, &cur.values, config)))
    });
    PsiResult::from_scores(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanorand::{WyRand, RNG};
    use proptest::prelude::*;

    fn uniform(lo: f64, hi: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64).collect()
    }

    fn random_sample(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = WyRand::new_seed(seed);
        (0..n)
            .map(|_| {
                let int: f64 = rng.generate::<u16>().into();
                int / f64::from(std::u16::MAX) * 1000.0
            })
            .collect()
    }

    #[test]
    fn exclusive_quantiles_of_one_to_hundred() {
        let data: Vec<f64> = (1..=100).map(f64::from).collect();
        let cuts = exclusive_quantiles(&data, 10).unwrap();
        assert_eq!(cuts.len(), 9);
        for (i, cut) in cuts.iter().enumerate() {
            let expected = 10.1 * (i + 1) as f64;
            assert!((cut - expected).abs() < 1e-9, "cut {} = {}", i, cut);
        }
    }

    #[test]
    fn exclusive_quantiles_clamp_small_samples() {
        let cuts = exclusive_quantiles(&[1.0, 2.0, 3.0], 10).unwrap();
        assert_eq!(cuts.len(), 9);
        assert!(cuts.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(exclusive_quantiles(&[1.0], 4), Err(QuantileError::TooFewPoints(1)));
        assert_eq!(exclusive_quantiles(&[2.0; 20], 4), Err(QuantileError::Constant));
    }

    // Distinct values, so no cut point can collapse onto the minimum.
    fn distinct_sample() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::btree_set(-100_000i32..100_000, (DEFAULT_BINS + 1)..400)
            .prop_map(|values| values.into_iter().map(f64::from).collect())
    }

    proptest! {
        #[test]
        fn identical_samples_have_zero_psi(
            sample in prop::collection::vec(-1.0e6f64..1.0e6, (DEFAULT_BINS + 1)..400),
        ) {
            prop_assert_eq!(psi(&sample, &sample, DEFAULT_BINS, DEFAULT_EPSILON), 0.0);
        }

        #[test]
        fn disjoint_supports_are_positive(reference in distinct_sample(), gap in 1.0f64..1.0e6) {
            // Reference values stay below 100_000, every shifted value lies above.
            let current: Vec<f64> = reference.iter().map(|value| value + 200_000.0 + gap).collect();
            prop_assert!(psi(&reference, &current, DEFAULT_BINS, DEFAULT_EPSILON) > 0.0);
        }
    }

    #[test]
    fn identical_seeded_samples_have_zero_psi() {
        for seed in 0..5 {
            let sample = random_sample(seed, 500);
            assert_eq!(psi(&sample, &sample, DEFAULT_BINS, DEFAULT_EPSILON), 0.0);
        }
        let sample = uniform(1.0, 100.0, 100);
        assert_eq!(score(&sample, &sample, PsiConfig::default()), PsiScore::Computed(0.0));
    }

    #[test]
    fn shifted_uniform_exceeds_common_threshold() {
        let reference = uniform(0.0, 100.0, 1000);
        let current = uniform(50.0, 150.0, 1000);
        assert!(psi(&reference, &current, DEFAULT_BINS, DEFAULT_EPSILON) > 0.1);
    }

    #[test]
    fn degenerate_inputs_default_to_zero() {
        let short: Vec<f64> = (0..10).map(f64::from).collect();
        let current = uniform(0.0, 100.0, 50);
        assert_eq!(psi(&short, &current, 10, DEFAULT_EPSILON), 0.0);
        assert_eq!(
            score(&short, &current, PsiConfig::default()),
            PsiScore::Insufficient(Degeneracy::TooFewReference { required: 11, found: 10 })
        );

        let reference = uniform(0.0, 100.0, 50);
        assert_eq!(psi(&reference, &[], 10, DEFAULT_EPSILON), 0.0);
        assert_eq!(
            score(&reference, &[], PsiConfig::default()),
            PsiScore::Insufficient(Degeneracy::EmptyCurrent)
        );

        let constant = vec![7.0; 100];
        assert_eq!(
            score(&constant, &current, PsiConfig::default()),
            PsiScore::Insufficient(Degeneracy::Quantiles(QuantileError::Constant))
        );
    }

    #[test]
    fn extreme_values_are_clamped_into_edge_bins() {
        let reference = uniform(0.0, 100.0, 100);
        let current = vec![f64::MAX, -f64::MAX, 1e300];
        let value = psi(&reference, &current, DEFAULT_BINS, DEFAULT_EPSILON);
        assert!(value.is_finite() && value > 0.0);
    }

    #[test]
    fn aggregate_is_mean_of_shared_features() {
        let mut reference = BTreeMap::new();
        let mut current = BTreeMap::new();
        reference.insert("AGE".to_string(), NumericSample::new("AGE", uniform(0.0, 100.0, 200)));
        current.insert("AGE".to_string(), NumericSample::new("AGE", uniform(50.0, 150.0, 200)));
        reference.insert("LIMIT_BAL".to_string(), NumericSample::new("LIMIT_BAL", uniform(0.0, 1.0, 200)));
        current.insert("LIMIT_BAL".to_string(), NumericSample::new("LIMIT_BAL", uniform(0.0, 1.0, 200)));
        reference.insert("max_delay".to_string(), NumericSample::new("max_delay", vec![1.0; 5]));
        current.insert("max_delay".to_string(), NumericSample::new("max_delay", vec![2.0; 5]));
        reference.insert("PAY_AMT1".to_string(), NumericSample::new("PAY_AMT1", uniform(0.0, 1.0, 200)));

        let result = compare_features(
            &reference,
            &current,
            &["AGE", "LIMIT_BAL", "max_delay", "PAY_AMT1", "BILL_AMT1"],
            PsiConfig::default(),
        );
        assert_eq!(result.feature_count, 3);
        assert!(!result.per_feature.contains_key("PAY_AMT1"));
        assert_eq!(result.per_feature["LIMIT_BAL"], 0.0);
        assert_eq!(result.per_feature["max_delay"], 0.0);
        assert!(result.insufficient.contains("max_delay"));
        assert!(!result.insufficient.contains("LIMIT_BAL"));
        let expected = result.per_feature["AGE"] / 3.0;
        assert!((result.aggregate - expected).abs() < 1e-12);
        assert_eq!(result.ranked()[0].0, "AGE");
    }

    #[test]
    fn empty_result_has_no_signal() {
        let result = PsiResult::from_scores(Vec::new());
        assert!(!result.has_signal());
        assert_eq!(result.aggregate, 0.0);
    }
}
