use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Per-request sampling settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// `<= 0.0` selects greedy decoding.
    pub temperature: f64,
    /// Nucleus mass; `>= 1.0` disables truncation.
    pub top_p: f64,
    /// Seed for reproducible sampling. Drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { temperature: 0.7, top_p: 0.9, seed: None }
    }
}

impl SamplingParams {
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }
}

/// Chooses one token id per decode step.
///
/// ## Pipeline (non-greedy)
///
/// 1. Divide logits by temperature.
/// 2. Softmax, subtracting the max finite logit first.
/// 3. Nucleus truncation over the probabilities sorted descending.
/// 4. Renormalize the retained mass.
/// 5. Draw a uniform value against the CDF in vocabulary order.
#[derive(Debug)]
pub struct Sampler {
    params: SamplingParams,
    rng: StdRng,
}

impl Sampler {
    pub fn new(params: SamplingParams) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { params, rng }
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    pub fn sample(&mut self, logits: &[f32]) -> CoreResult<u32> {
        if self.params.is_greedy() {
            return greedy(logits);
        }
        let probs = distribution(logits, self.params.temperature, self.params.top_p)?;
        let r: f32 = self.rng.random();
        Ok(draw(&probs, r))
    }
}

/// Arg-max over the finite logits. Ties resolve to the lowest index.
pub fn greedy(logits: &[f32]) -> CoreResult<u32> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i as u32)
        .ok_or_else(|| CoreError::Sampling(format!("no finite logits among {}", logits.len())))
}

/// Probability vector actually sampled from: temperature, softmax, nucleus
/// truncation, renormalization.
pub fn distribution(logits: &[f32], temperature: f64, top_p: f64) -> CoreResult<Vec<f32>> {
    let mut probs = softmax(logits, temperature)?;
    nucleus_filter(&mut probs, top_p);
    renormalize(&mut probs);
    Ok(probs)
}

fn softmax(logits: &[f32], temperature: f64) -> CoreResult<Vec<f32>> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(CoreError::Sampling(format!("no finite logits among {}", logits.len())));
    }

    // Scaled in f64: a tiny temperature would round to zero as f32.
    let weights: Vec<f64> = logits
        .iter()
        .map(|&v| if v.is_finite() { (f64::from(v - max) / temperature).exp() } else { 0.0 })
        .collect();
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0 && sum.is_finite()) {
        return Err(CoreError::Sampling(format!("degenerate softmax (sum {sum})")));
    }
    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

/// Zero every probability outside the nucleus.
///
/// Walks the entries in descending order accumulating mass; the entry whose
/// addition reaches `top_p` is kept and everything after it is zeroed.
/// `top_p >= 1.0` leaves the distribution untouched.
pub fn nucleus_filter(probs: &mut [f32], top_p: f64) {
    if top_p >= 1.0 || probs.is_empty() {
        return;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut cumulative = 0.0f64;
    let mut keep = order.len();
    for (rank, &idx) in order.iter().enumerate() {
        cumulative += probs[idx] as f64;
        if cumulative >= top_p {
            keep = rank + 1;
            break;
        }
    }
    for &idx in &order[keep..] {
        probs[idx] = 0.0;
    }
}

fn renormalize(probs: &mut [f32]) {
    let sum: f32 = probs.iter().sum();
    if sum > 0.0 {
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }
}

/// Index whose CDF bucket contains `r` (`r` in `[0, 1)`).
fn draw(probs: &[f32], r: f32) -> u32 {
    let mut cumulative = 0.0f32;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if r < cumulative {
            return i as u32;
        }
    }
    // Rounding left the CDF just short of 1.0.
    probs
        .iter()
        .rposition(|&p| p > 0.0)
        .unwrap_or(probs.len().saturating_sub(1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(temperature: f64, top_p: f64, seed: u64) -> Sampler {
        Sampler::new(SamplingParams { temperature, top_p, seed: Some(seed) })
    }

    #[test]
    fn test_greedy_picks_argmax() {
        assert_eq!(greedy(&[0.1, 0.2, 0.3, 5.0, 0.1]).unwrap(), 3);
    }

    #[test]
    fn test_greedy_tie_takes_first() {
        assert_eq!(greedy(&[10.0, 1.0, 10.0]).unwrap(), 0);
    }

    #[test]
    fn test_greedy_ignores_nan() {
        assert_eq!(greedy(&[f32::NAN, 1.0, 2.0]).unwrap(), 2);
    }

    #[test]
    fn test_greedy_is_repeatable_regardless_of_seed() {
        let logits = [0.3, 2.5, 2.4, -1.0];
        for seed in 0..20 {
            assert_eq!(sampler(0.0, 0.9, seed).sample(&logits).unwrap(), 1);
            assert_eq!(sampler(-1.0, 0.5, seed).sample(&logits).unwrap(), 1);
        }
    }

    #[test]
    fn test_empty_logits_is_error() {
        assert!(matches!(greedy(&[]), Err(CoreError::Sampling(_))));
        assert!(matches!(sampler(1.0, 0.9, 1).sample(&[]), Err(CoreError::Sampling(_))));
    }

    #[test]
    fn test_nucleus_keeps_crossing_entry() {
        let mut probs = vec![0.5f32, 0.3, 0.1, 0.1];
        nucleus_filter(&mut probs, 0.7);
        assert_eq!(probs, vec![0.5, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn test_nucleus_works_on_unsorted_input() {
        let mut probs = vec![0.1f32, 0.3, 0.1, 0.5];
        nucleus_filter(&mut probs, 0.7);
        assert_eq!(probs, vec![0.0, 0.3, 0.0, 0.5]);
    }

    #[test]
    fn test_nucleus_full_mass_zeroes_nothing() {
        let mut probs = vec![0.25f32, 0.25, 0.25, 0.25];
        nucleus_filter(&mut probs, 1.0);
        assert_eq!(probs, vec![0.25; 4]);
    }

    #[test]
    fn test_distribution_top_p_one_keeps_everything() {
        let logits = [1.0f32, 2.0, 3.0, -4.0, 0.5];
        let probs = distribution(&logits, 1.0, 1.0).unwrap();
        assert!(probs.iter().all(|&p| p > 0.0));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        let max = 3.0f32;
        let z: f32 = logits.iter().map(|v| (v - max).exp()).sum();
        for (p, v) in probs.iter().zip(logits) {
            assert!((p - (v - max).exp() / z).abs() < 1e-6);
        }
    }

    #[test]
    fn test_distribution_renormalizes_retained_mass() {
        let logits = [2.0f32.ln(), 1.0f32.ln(), 0.5f32.ln()];
        let probs = distribution(&logits, 1.0, 0.5).unwrap();
        assert_eq!(probs[1], 0.0);
        assert_eq!(probs[2], 0.0);
        assert!((probs[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_seeded_sampling_is_deterministic() {
        let logits: Vec<f32> = (0..50).map(|i| (i as f32 * 0.37).sin()).collect();
        let a: Vec<u32> = {
            let mut s = sampler(0.8, 0.95, 42);
            (0..10).map(|_| s.sample(&logits).unwrap()).collect()
        };
        let b: Vec<u32> = {
            let mut s = sampler(0.8, 0.95, 42);
            (0..10).map(|_| s.sample(&logits).unwrap()).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_dominant_logit_is_selected() {
        let mut logits = vec![0.0f32; 20];
        logits[7] = 50.0;
        let mut s = Sampler::new(SamplingParams { temperature: 1.0, top_p: 0.95, seed: None });
        assert_eq!(s.sample(&logits).unwrap(), 7);
    }

    #[test]
    fn test_sample_never_picks_truncated_token() {
        let logits = [0.5f32.ln(), 0.3f32.ln(), 0.1f32.ln(), 0.1f32.ln()];
        let mut s = sampler(1.0, 0.7, 7);
        for _ in 0..200 {
            assert!(s.sample(&logits).unwrap() < 2);
        }
    }

    #[test]
    fn test_draw_walks_cdf_in_index_order() {
        let probs = [0.2f32, 0.0, 0.8];
        assert_eq!(draw(&probs, 0.0), 0);
        assert_eq!(draw(&probs, 0.19), 0);
        assert_eq!(draw(&probs, 0.2), 2);
        assert_eq!(draw(&probs, 0.9999999), 2);
    }

    #[test]
    fn test_vanishing_temperature_behaves_like_greedy() {
        let logits = [0.5, 3.0, 1.0];
        let probs = distribution(&logits, 1e-300, 0.9).unwrap();
        assert_eq!(probs, vec![0.0, 1.0, 0.0]);
        for seed in 0..5 {
            assert_eq!(sampler(1e-50, 0.9, seed).sample(&logits).unwrap(), 1);
        }
    }
}
