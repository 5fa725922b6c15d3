//! Logits to token ids.
//!
//! Every function here is pure apart from the random draw in `sample`. An
//! empty logit vector yields `None` rather than an index.

use crate::GenerationConfig;
use rand::Rng;

/// Divide every logit by `temperature`. A temperature of zero (or below)
/// leaves the logits untouched.
pub fn temperature_scale(logits: &mut [f32], temperature: f32) {
    if temperature > 0.0 {
        for logit in logits.iter_mut() {
            *logit /= temperature;
        }
    }
}

/// Numerically stable softmax.
///
/// The maximum is subtracted before exponentiating and the sum is accumulated
/// in f64. NaN scores get zero mass. If any score is `+inf` the mass is shared
/// evenly between those entries; if every score is `-inf` the result is
/// uniform.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max = logits
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::NEG_INFINITY, f32::max);

    if max == f32::INFINITY {
        let count = logits.iter().filter(|&&v| v == f32::INFINITY).count() as f32;
        return logits
            .iter()
            .map(|&v| if v == f32::INFINITY { 1.0 / count } else { 0.0 })
            .collect();
    }
    if max == f32::NEG_INFINITY {
        let uniform = 1.0 / logits.len() as f32;
        return vec![uniform; logits.len()];
    }

    let exps: Vec<f64> = logits
        .iter()
        .map(|&v| if v.is_nan() { 0.0 } else { ((v - max) as f64).exp() })
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|&e| (e / sum) as f32).collect()
}

/// A distribution restricted to a subset of vocabulary indices.
///
/// `indices[i]` is the vocabulary id whose probability is `probs[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidates {
    pub indices: Vec<usize>,
    pub probs: Vec<f32>,
}

impl Candidates {
    /// Every index, in vocabulary order.
    pub fn full(probs: Vec<f32>) -> Self {
        Self {
            indices: (0..probs.len()).collect(),
            probs,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Keep the `k` most probable entries and renormalize them.
///
/// Candidates are ordered by descending probability; equal probabilities keep
/// the lower index first. With `k == 0` or `k >= probs.len()` the full
/// distribution is returned unchanged.
pub fn top_k_filter(probs: &[f32], k: usize) -> Candidates {
    if k == 0 || k >= probs.len() {
        return Candidates::full(probs.to_vec());
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    // stable: ties stay in index order
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    order.truncate(k);

    let sum: f32 = order.iter().map(|&i| probs[i]).sum();
    let probs = if sum > 0.0 {
        order.iter().map(|&i| probs[i] / sum).collect()
    } else {
        vec![1.0 / k as f32; k]
    };

    Candidates {
        indices: order,
        probs,
    }
}

/// Pick the candidate whose cumulative mass first exceeds `r`.
///
/// If rounding leaves the total short of `r`, the last candidate is returned.
pub fn sample_at(candidates: &Candidates, r: f32) -> Option<usize> {
    let last = *candidates.indices.last()?;
    let mut cumulative = 0.0f32;
    for (&index, &p) in candidates.indices.iter().zip(&candidates.probs) {
        cumulative += p;
        if r < cumulative {
            return Some(index);
        }
    }
    Some(last)
}

/// Draw `r` uniformly from `[0, 1)` and pick the matching candidate.
pub fn sample<R: Rng + ?Sized>(candidates: &Candidates, rng: &mut R) -> Option<usize> {
    let r: f32 = rng.r#gen();
    sample_at(candidates, r)
}

/// Index of the largest logit, leftmost on ties. NaN scores are ignored.
pub fn greedy_decode(logits: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in logits.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Temperature scaling, softmax, top-K and a random draw.
pub fn sample_token<R: Rng + ?Sized>(
    logits: &[f32],
    config: &GenerationConfig,
    rng: &mut R,
) -> Option<usize> {
    if logits.is_empty() {
        return None;
    }
    let mut scaled = logits.to_vec();
    temperature_scale(&mut scaled, config.temperature);
    let probs = softmax(&scaled);
    let candidates = top_k_filter(&probs, config.top_k);
    sample(&candidates, rng)
}
