//! Training: time-based split, stratified cross-validation, final fit.

use chrono::Utc;
use uuid::Uuid;

use cashguard_core::TrainingConfig;

use crate::artifact::{MetricSummary, ModelArtifact, TrainingReport};
use crate::classifier::LogisticRegression;
use crate::error::{RiskError, RiskResult};
use crate::features::{FEATURE_COLUMNS, FeatureTable};
use crate::scaler::StandardScaler;

/// Train a model on labelled feature rows.
///
/// Rows are ordered by (issue date, invoice id); the oldest share trains and
/// the newest `test_ratio` is held out. Cross-validation runs on the training
/// partition only. Either the whole artifact is returned or an error, never a
/// partially fitted model.
pub fn train(
    table: &FeatureTable,
    labels: &[bool],
    config: &TrainingConfig,
) -> RiskResult<ModelArtifact> {
    if table.rows.len() != labels.len() {
        return Err(RiskError::validation(format!(
            "{} feature rows but {} labels",
            table.rows.len(),
            labels.len()
        )));
    }
    let available = table.rows.len();
    if available < config.min_training_rows {
        return Err(RiskError::InsufficientData {
            available,
            required: config.min_training_rows,
        });
    }

    let (train_idx, test_idx) = time_split(table, config.test_ratio);
    let x: Vec<&[f64]> = train_idx
        .iter()
        .chain(&test_idx)
        .map(|i| &table.rows[*i].values[..])
        .collect();
    let y: Vec<bool> = train_idx.iter().chain(&test_idx).map(|i| labels[*i]).collect();
    let (x_train, x_test) = x.split_at(train_idx.len());
    let (y_train, y_test) = y.split_at(train_idx.len());

    let positives = y_train.iter().filter(|l| **l).count();
    if positives == 0 || positives == y_train.len() {
        return Err(RiskError::SingleClass {
            late: positives,
            on_time: y_train.len() - positives,
        });
    }
    if y_train.len() < config.cv_folds {
        return Err(RiskError::InsufficientData {
            available: y_train.len(),
            required: config.cv_folds,
        });
    }

    let run_id = Uuid::now_v7();
    let folds = stratified_folds(y_train, config.cv_folds);
    let mut fold_accuracy = Vec::with_capacity(config.cv_folds);
    let mut fold_auc = Vec::with_capacity(config.cv_folds);
    for fold in 0..config.cv_folds {
        let (fit_x, fit_y, eval_x, eval_y) = partition(x_train, y_train, &folds, fold);
        if eval_y.is_empty() || fit_y.iter().all(|l| *l) || fit_y.iter().all(|l| !*l) {
            continue;
        }
        let (scaler, model) = fit(run_id, &fit_x, &fit_y, config)?;
        let probs = predict(&scaler, &model, &eval_x);
        fold_accuracy.push(accuracy(&probs, &eval_y));
        if let Some(auc) = roc_auc(&probs, &eval_y) {
            fold_auc.push(auc);
        }
    }

    let (scaler, classifier) = fit(run_id, x_train, y_train, config)?;
    let test_probs = predict(&scaler, &classifier, x_test);

    let report = TrainingReport {
        train_rows: x_train.len(),
        test_rows: x_test.len(),
        train_late_rate: positives as f64 / y_train.len() as f64,
        cv_folds: config.cv_folds,
        cv_accuracy: MetricSummary::of(&fold_accuracy),
        cv_roc_auc: MetricSummary::of(&fold_auc),
        test_accuracy: accuracy(&test_probs, y_test),
        test_roc_auc: roc_auc(&test_probs, y_test),
    };

    let feature_importances = FEATURE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .zip(classifier.importances())
        .collect();

    tracing::info!(
        %run_id,
        train_rows = report.train_rows,
        test_rows = report.test_rows,
        test_accuracy = report.test_accuracy,
        test_roc_auc = ?report.test_roc_auc,
        "risk model trained"
    );

    Ok(ModelArtifact {
        run_id,
        trained_at: Utc::now(),
        feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        scaler,
        classifier,
        feature_importances,
        report,
    })
}

/// Size of the training partition; both sides keep at least one row.
/// Row indices of the training and test partitions.
///
/// Rows are ordered by (issue date, invoice id); the test partition is the
/// newest `test_ratio` share, so no test row predates a training row.
pub(crate) fn time_split(table: &FeatureTable, test_ratio: f64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..table.rows.len()).collect();
    order.sort_by(|a, b| {
        let (ra, rb) = (&table.rows[*a], &table.rows[*b]);
        ra.issue_date
            .cmp(&rb.issue_date)
            .then_with(|| ra.invoice_id.cmp(&rb.invoice_id))
    });
    let test = order.split_off(train_len(order.len(), test_ratio).min(order.len()));
    (order, test)
}

fn train_len(rows: usize, test_ratio: f64) -> usize {
    let train = (rows as f64 * (1.0 - test_ratio)).floor() as usize;
    train.clamp(1, rows.saturating_sub(1).max(1))
}

/// Fold index per training row. Each class is dealt round-robin so every fold
/// receives the same class mix.
fn stratified_folds(labels: &[bool], k: usize) -> Vec<usize> {
    let mut seen = [0usize; 2];
    labels
        .iter()
        .map(|l| {
            let class = usize::from(*l);
            let fold = seen[class] % k;
            seen[class] += 1;
            fold
        })
        .collect()
}

type Partition<'a> = (Vec<&'a [f64]>, Vec<bool>, Vec<&'a [f64]>, Vec<bool>);

fn partition<'a>(x: &[&'a [f64]], y: &[bool], folds: &[usize], hold_out: usize) -> Partition<'a> {
    let mut out: Partition<'a> = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for ((row, label), fold) in x.iter().zip(y).zip(folds) {
        if *fold == hold_out {
            out.2.push(*row);
            out.3.push(*label);
        } else {
            out.0.push(*row);
            out.1.push(*label);
        }
    }
    out
}

fn fit(
    run_id: Uuid,
    x: &[&[f64]],
    y: &[bool],
    config: &TrainingConfig,
) -> RiskResult<(StandardScaler, LogisticRegression)> {
    let scaler = StandardScaler::fit(run_id, x)?;
    let scaled = scaler.transform_all(x);
    let model = LogisticRegression::fit(run_id, &scaled, y, config)?;
    Ok((scaler, model))
}

fn predict(scaler: &StandardScaler, model: &LogisticRegression, x: &[&[f64]]) -> Vec<f64> {
    x.iter()
        .map(|row| model.predict_proba(&scaler.transform(row)))
        .collect()
}

pub(crate) fn accuracy(probs: &[f64], labels: &[bool]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let hits = probs
        .iter()
        .zip(labels)
        .filter(|(p, l)| (**p >= 0.5) == **l)
        .count();
    hits as f64 / labels.len() as f64
}

/// Rank-based ROC-AUC with averaged ranks for ties. `None` for a single class.
pub(crate) fn roc_auc(probs: &[f64], labels: &[bool]) -> Option<f64> {
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut idx: Vec<usize> = (0..probs.len()).collect();
    idx.sort_by(|a, b| probs[*a].total_cmp(&probs[*b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < idx.len() {
        let mut end = start;
        while end + 1 < idx.len() && probs[idx[end + 1]] == probs[idx[start]] {
            end += 1;
        }
        let avg_rank = (start + end) as f64 / 2.0 + 1.0;
        rank_sum += idx[start..=end]
            .iter()
            .filter(|i| labels[**i])
            .count() as f64
            * avg_rank;
        start = end + 1;
    }

    let p = positives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FEATURE_COUNT, FeatureRow};
    use chrono::{Duration, NaiveDate};

    fn synthetic(rows: usize) -> (FeatureTable, Vec<bool>) {
        let base = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let mut table = FeatureTable::default();
        let mut labels = Vec::new();
        for i in 0..rows {
            let late = i % 3 == 0;
            let mut values = [0.0; FEATURE_COUNT];
            values[0] = if late { -20.0 } else { 15.0 } + (i % 5) as f64;
            values[18] = if late { 0.8 } else { 0.1 };
            values[12] = 7.0 + (i % 7) as f64 * 0.1;
            let issue = base + Duration::days(i as i64);
            table.rows.push(FeatureRow {
                invoice_id: format!("INV-{i:04}").as_str().into(),
                customer_id: "C-1".into(),
                issue_date: issue,
                due_date: issue + Duration::days(30),
                amount_cents: 100_000,
                outstanding_cents: 100_000,
                values,
            });
            labels.push(late);
        }
        (table, labels)
    }

    #[test]
    fn refuses_below_minimum_rows() {
        let (table, labels) = synthetic(20);
        let err = train(&table, &labels, &TrainingConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RiskError::InsufficientData {
                available: 20,
                required: 50
            }
        ));
    }

    #[test]
    fn refuses_single_class_training_partition() {
        let (table, _) = synthetic(60);
        let labels = vec![false; 60];
        let err = train(&table, &labels, &TrainingConfig::default()).unwrap_err();
        assert!(matches!(err, RiskError::SingleClass { late: 0, on_time: 45 }));
    }

    #[test]
    fn late_rows_only_in_the_held_out_tail_still_count_as_single_class() {
        let (table, _) = synthetic(60);
        let labels: Vec<bool> = (0..60).map(|i| i >= 45).collect();
        let err = train(&table, &labels, &TrainingConfig::default()).unwrap_err();
        assert!(matches!(err, RiskError::SingleClass { late: 0, on_time: 45 }));
        assert!(err.to_string().contains("single class"));
    }

    #[test]
    fn held_out_rows_are_the_newest_regardless_of_input_order() {
        let (mut table, _) = synthetic(40);
        table.rows.reverse();
        table.rows.rotate_left(7);
        let (train_idx, test_idx) = time_split(&table, 0.25);
        assert_eq!(train_idx.len(), 30);

        let test_ids: Vec<&str> = test_idx.iter().map(|i| table.rows[*i].invoice_id.as_str()).collect();
        let expected: Vec<String> = (30..40).map(|i| format!("INV-{i:04}")).collect();
        assert_eq!(test_ids, expected.iter().map(String::as_str).collect::<Vec<_>>());

        let newest_train = train_idx.iter().map(|i| table.rows[*i].issue_date).max().unwrap();
        let oldest_test = test_idx.iter().map(|i| table.rows[*i].issue_date).min().unwrap();
        assert!(newest_train < oldest_test);
    }

    #[test]
    fn same_day_rows_split_on_invoice_id() {
        let (mut table, _) = synthetic(8);
        let day = table.rows[0].issue_date;
        for row in &mut table.rows {
            row.issue_date = day;
        }
        table.rows.swap(0, 7);
        let (_, test_idx) = time_split(&table, 0.25);
        let test_ids: Vec<&str> = test_idx.iter().map(|i| table.rows[*i].invoice_id.as_str()).collect();
        assert_eq!(test_ids, vec!["INV-0006", "INV-0007"]);
    }

    #[test]
    fn trains_a_bound_artifact_that_ranks_late_rows_higher() {
        let (table, labels) = synthetic(80);
        let artifact = train(&table, &labels, &TrainingConfig::default()).unwrap();

        artifact.validate().unwrap();
        assert_eq!(artifact.report.train_rows, 60);
        assert_eq!(artifact.report.test_rows, 20);
        assert_eq!(artifact.feature_importances.len(), FEATURE_COUNT);
        let total: f64 = artifact.feature_importances.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(artifact.report.test_roc_auc, Some(1.0));

        let late = artifact.score_row(&table.rows[0]);
        let on_time = artifact.score_row(&table.rows[1]);
        assert!(late > on_time);
        assert!((0.0..=100.0).contains(&late));
    }

    #[test]
    fn training_is_deterministic_apart_from_run_metadata() {
        let (table, labels) = synthetic(60);
        let a = train(&table, &labels, &TrainingConfig::default()).unwrap();
        let b = train(&table, &labels, &TrainingConfig::default()).unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.classifier.weights, b.classifier.weights);
        assert_eq!(a.scaler.mean, b.scaler.mean);
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn auc_handles_ties_and_single_class() {
        assert_eq!(roc_auc(&[0.1, 0.9], &[false, true]), Some(1.0));
        assert_eq!(roc_auc(&[0.5, 0.5], &[false, true]), Some(0.5));
        assert_eq!(roc_auc(&[0.2, 0.3], &[true, true]), None);
    }

    #[test]
    fn folds_are_stratified() {
        let labels = [true, false, true, false, true, false];
        assert_eq!(stratified_folds(&labels, 3), vec![0, 0, 1, 1, 2, 2]);
    }
}
