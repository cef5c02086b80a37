use std::cmp::Ordering;

/// Precision/recall/F1 for one side of the confusion matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationReport {
    pub samples: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub brier: f64,
    pub roc_auc: f64,
    pub negative: ClassMetrics,
    pub positive: ClassMetrics,
}

/// Evaluates positive-class probabilities against binary labels at a 0.5
/// decision threshold. Mismatched or empty inputs produce a zeroed report.
pub fn evaluate_binary(probs: &[f64], labels: &[u8]) -> ClassificationReport {
    if probs.is_empty() || probs.len() != labels.len() {
        return ClassificationReport::default();
    }

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut tn = 0usize;
    let mut fn_ = 0usize;
    let mut log_loss_sum = 0.0;
    let mut brier_sum = 0.0;

    for (&p, &y) in probs.iter().zip(labels) {
        let predicted = p >= 0.5;
        match (predicted, y == 1) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
        let actual_prob = if y == 1 { p } else { 1.0 - p };
        log_loss_sum += -actual_prob.clamp(1e-12, 1.0).ln();
        brier_sum += (p - f64::from(y)).powi(2);
    }

    let n = probs.len() as f64;
    ClassificationReport {
        samples: probs.len(),
        accuracy: (tp + tn) as f64 / n,
        log_loss: log_loss_sum / n,
        brier: brier_sum / n,
        roc_auc: roc_auc(probs, labels),
        negative: class_metrics(tn, fn_, fp),
        positive: class_metrics(tp, fp, fn_),
    }
}

fn class_metrics(true_hits: usize, false_hits: usize, missed: usize) -> ClassMetrics {
    let precision = ratio(true_hits, true_hits + false_hits);
    let recall = ratio(true_hits, true_hits + missed);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassMetrics {
        precision,
        recall,
        f1,
        support: true_hits + missed,
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Rank-based ROC AUC with tie-averaged ranks. A single-class input has no
/// ranking to measure and scores 0.5.
pub fn roc_auc(probs: &[f64], labels: &[u8]) -> f64 {
    let n = probs.len();
    if n == 0 || n != labels.len() {
        return 0.5;
    }
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| probs[a].partial_cmp(&probs[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|&(&y, _)| y == 1)
        .map(|(_, &r)| r)
        .sum();
    let p = positives as f64;
    (positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}
