use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::core::registry::CENTERS;

/// Cap on each score population before density estimation. Pair
/// enumeration is quadratic in the sample count; 256 scores per side is
/// enough for a stable density estimate.
const MAX_SCORES: usize = 256;

/// Densities below this floor are clamped before the ratio, so a score
/// far outside one population yields a large finite log-likelihood
/// ratio instead of +/-inf or NaN.
const DENSITY_FLOOR: f64 = 1e-12;

/// Minimum kernel bandwidth. A zero-variance population would otherwise
/// produce h = 0 and a degenerate kernel.
const MIN_BANDWIDTH: f64 = 1e-6;

/// Rescale a raw center-distance table row into log-likelihood-ratio
/// scores, in place.
///
/// Every unordered sample pair contributes the table value addressed by
/// its two cluster assignments; same-label pairs form the genuine score
/// population, the rest the impostor population. Each cell then becomes
/// `ln(density_genuine(cell) / density_impostor(cell))` under Gaussian
/// kernel density estimates of the two populations.
///
/// Leaves the row untouched (with a warning) if either population is
/// empty; that means the labeling was degenerate for this subspace, and
/// a raw geometric table is still usable.
pub fn calibrate_lut(lut: &mut [f32], assignments: &[usize], labels: &[i32], seed: u64) {
    debug_assert_eq!(lut.len(), CENTERS * CENTERS);
    debug_assert_eq!(assignments.len(), labels.len());

    let mut genuine = Vec::new();
    let mut impostor = Vec::new();
    for i in 0..assignments.len() {
        for j in (i + 1)..assignments.len() {
            let score = lut[assignments[i] * CENTERS + assignments[j]];
            if labels[i] == labels[j] {
                genuine.push(score);
            } else {
                impostor.push(score);
            }
        }
    }

    if genuine.is_empty() || impostor.is_empty() {
        warn!(
            genuine = genuine.len(),
            impostor = impostor.len(),
            "degenerate label distribution, leaving subspace table uncalibrated"
        );
        return;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let genuine = downsample(genuine, MAX_SCORES, &mut rng);
    let impostor = downsample(impostor, MAX_SCORES, &mut rng);

    let h_genuine = kernel_density_bandwidth(&genuine);
    let h_impostor = kernel_density_bandwidth(&impostor);

    for cell in lut.iter_mut() {
        let g = kernel_density_estimation(&genuine, *cell as f64, h_genuine).max(DENSITY_FLOOR);
        let imp = kernel_density_estimation(&impostor, *cell as f64, h_impostor).max(DENSITY_FLOOR);
        *cell = (g / imp).ln() as f32;
    }
}

/// Uniform random subsample of at most `k` scores, without replacement.
/// Never reorders a population that already fits.
fn downsample(scores: Vec<f32>, k: usize, rng: &mut StdRng) -> Vec<f32> {
    if scores.len() <= k {
        return scores;
    }
    rand::seq::index::sample(rng, scores.len(), k)
        .iter()
        .map(|i| scores[i])
        .collect()
}

/// Rule-of-thumb Gaussian kernel bandwidth: (4 sigma^5 / 3n)^(1/5).
fn kernel_density_bandwidth(scores: &[f32]) -> f64 {
    let n = scores.len() as f64;
    let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = scores.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    (4.0 * stddev.powi(5) / (3.0 * n)).powf(0.2).max(MIN_BANDWIDTH)
}

/// Gaussian kernel density estimate of `scores` at `x` with bandwidth `h`.
fn kernel_density_estimation(scores: &[f32], x: f64, h: f64) -> f64 {
    let sqrt_2pi = (2.0 * std::f64::consts::PI).sqrt();
    let sum: f64 = scores
        .iter()
        .map(|&s| (-((s as f64 - x) / h).powi(2) / 2.0).exp() / sqrt_2pi)
        .sum();
    sum / (scores.len() as f64 * h)
}
