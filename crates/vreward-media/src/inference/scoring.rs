//! Logit post-processing for classification scores.

/// Numerically stable softmax; empty in, empty out.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let Some(max) = logits.iter().copied().map(f64::from).reduce(f64::max) else {
        return Vec::new();
    };
    let exps: Vec<f64> = logits.iter().map(|&l| (f64::from(l) - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Probability of `positive` if it is a known label, else the max probability.
pub fn positive_class_score(probs: &[f64], labels: &[String], positive: &str) -> Option<f64> {
    let score = match labels.iter().position(|l| l == positive) {
        Some(idx) => probs.get(idx).copied(),
        None => probs.iter().copied().reduce(f64::max),
    }?;
    score.is_finite().then(|| score.clamp(0.0, 1.0))
}

/// Uniform mean of window scores, 0 when there are none.
pub fn mean_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    (scores.iter().sum::<f64>() / scores.len() as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn test_softmax_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_positive_label_by_name() {
        let probs = softmax(&[0.0, 0.0]);
        let score = positive_class_score(&probs, &labels(&["simulator", "real"]), "real").unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_label_uses_max() {
        let probs = vec![0.2, 0.7, 0.1];
        let score = positive_class_score(&probs, &labels(&["a", "b", "c"]), "real").unwrap();
        assert!((score - 0.7).abs() < 1e-9);
        assert!(positive_class_score(&[], &labels(&["a"]), "real").is_none());
    }

    #[test]
    fn test_mean_score() {
        assert_eq!(mean_score(&[]), 0.0);
        assert!((mean_score(&[0.2, 0.4, 0.9]) - 0.5).abs() < 1e-9);
    }
}
