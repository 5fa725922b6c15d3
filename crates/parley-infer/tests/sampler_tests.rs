use parley_infer::sampler::{
    greedy_decode, sample, sample_at, sample_token, softmax, temperature_scale, top_k_filter,
    Candidates,
};
use parley_infer::GenerationConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn assert_sums_to_one(probs: &[f32]) {
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5, "sum was {sum}");
}

#[test]
fn test_temperature_scale_divides() {
    let mut logits = vec![1.0, -2.0, 4.0];
    temperature_scale(&mut logits, 2.0);
    assert_eq!(logits, vec![0.5, -1.0, 2.0]);
}

#[test]
fn test_temperature_zero_leaves_logits() {
    let mut logits = vec![1.0, -2.0, 4.0];
    temperature_scale(&mut logits, 0.0);
    assert_eq!(logits, vec![1.0, -2.0, 4.0]);
}

#[test]
fn test_softmax_sums_to_one() {
    for logits in [
        vec![0.0],
        vec![1.0, 2.0, 3.0],
        vec![-5.0, 0.0, 5.0, 10.0],
        vec![1000.0, -1000.0, 0.0],
        vec![3.0e38, -3.0e38, 1.0],
        vec![-80.0, -90.0, -100.0],
    ] {
        let probs = softmax(&logits);
        assert_eq!(probs.len(), logits.len());
        assert_sums_to_one(&probs);
        assert!(probs.iter().all(|p| p.is_finite() && *p >= 0.0));
    }
}

#[test]
fn test_softmax_shift_invariant() {
    let logits = vec![0.3, -1.2, 2.5, 0.0, 1.1];
    let shifted: Vec<f32> = logits.iter().map(|v| v + 42.0).collect();
    let a = softmax(&logits);
    let b = softmax(&shifted);
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-5);
    }
}

#[test]
fn test_softmax_non_finite_inputs() {
    let probs = softmax(&[f32::NEG_INFINITY, f32::NEG_INFINITY]);
    assert_eq!(probs, vec![0.5, 0.5]);

    let probs = softmax(&[1.0, f32::INFINITY, 2.0]);
    assert_eq!(probs, vec![0.0, 1.0, 0.0]);

    let probs = softmax(&[f32::NAN, 0.0]);
    assert_eq!(probs, vec![0.0, 1.0]);

    assert!(softmax(&[]).is_empty());
}

#[test]
fn test_top_k_disabled_returns_full_distribution() {
    let probs = vec![0.1, 0.6, 0.3];
    for k in [0, 3, 10] {
        let candidates = top_k_filter(&probs, k);
        assert_eq!(candidates.indices, vec![0, 1, 2]);
        assert_eq!(candidates.probs, probs);
    }
}

#[test]
fn test_top_k_selects_and_renormalizes() {
    let probs = vec![0.1, 0.4, 0.2, 0.3];
    let candidates = top_k_filter(&probs, 2);
    assert_eq!(candidates.indices, vec![1, 3]);
    assert_sums_to_one(&candidates.probs);
    assert!((candidates.probs[0] - 0.4 / 0.7).abs() < 1e-6);
}

#[test]
fn test_top_k_distinct_indices() {
    let probs = softmax(&[0.5, 0.5, 0.5, 0.1, 0.9, 0.9]);
    for k in 1..6 {
        let candidates = top_k_filter(&probs, k);
        assert_eq!(candidates.len(), k);
        let mut sorted = candidates.indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), k);
        assert_sums_to_one(&candidates.probs);
    }
}

#[test]
fn test_top_k_ties_prefer_lower_index() {
    let probs = vec![0.2, 0.3, 0.2, 0.3];
    assert_eq!(top_k_filter(&probs, 1).indices, vec![1]);
    assert_eq!(top_k_filter(&probs, 3).indices, vec![1, 3, 0]);
}

#[test]
fn test_sample_one_hot_always_returns_hot_index() {
    let candidates = Candidates::full(vec![0.0, 0.0, 1.0, 0.0]);
    for r in [0.0, 1e-7, 0.25, 0.5, 0.999_999] {
        assert_eq!(sample_at(&candidates, r), Some(2));
    }
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        assert_eq!(sample(&candidates, &mut rng), Some(2));
    }
}

#[test]
fn test_sample_falls_back_to_last_index() {
    let candidates = Candidates {
        indices: vec![4, 9],
        probs: vec![0.3, 0.3],
    };
    assert_eq!(sample_at(&candidates, 0.9), Some(9));
    assert_eq!(sample_at(&candidates, 0.1), Some(4));
}

#[test]
fn test_sample_empty_is_none() {
    let candidates = Candidates::full(Vec::new());
    assert_eq!(sample_at(&candidates, 0.5), None);
}

#[test]
fn test_greedy_decode() {
    assert_eq!(greedy_decode(&[0.1, 0.9, 0.3]), Some(1));
    assert_eq!(greedy_decode(&[]), None);
    assert_eq!(greedy_decode(&[2.0, 5.0, 5.0]), Some(1));
    assert_eq!(greedy_decode(&[f32::NAN, -1.0, -3.0]), Some(1));
}

#[test]
fn test_sample_token_respects_top_k() {
    let logits = vec![5.0, 4.9, -10.0, -10.0, -10.0];
    let config = GenerationConfig::new(1.0, 2).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let id = sample_token(&logits, &config, &mut rng).unwrap();
        assert!(id < 2);
    }
}

#[test]
fn test_sample_token_empty_logits() {
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(
        sample_token(&[], &GenerationConfig::default(), &mut rng),
        None
    );
}
