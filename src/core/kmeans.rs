use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::simd::get_euclidean_sq;

/// K-means with kmeans++ seeding, a bounded Lloyd iteration count and
/// best-of-N restarts. Matches the training policy of the codec: the
/// iteration bound keeps worst-case training time predictable and the
/// restarts compensate for bad seedings.
pub struct KMeans {
    pub k: usize,
    pub max_iters: usize,
    pub restarts: usize,
}

/// Result of the winning restart.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// k centers, flat row-major (k * dim).
    pub centers: Vec<f32>,
    /// Center index per input point.
    pub assignments: Vec<usize>,
    /// Sum of squared distances from each point to its center.
    pub inertia: f64,
}

impl KMeans {
    pub fn new(k: usize, max_iters: usize, restarts: usize) -> Self {
        Self { k, max_iters, restarts }
    }

    /// Cluster `points` (flat row-major, `dim` floats per row).
    /// Deterministic for a fixed `seed`; restarts perturb the seed so
    /// each attempt sees a different initialization.
    pub fn fit(&self, points: &[f32], dim: usize, seed: u64) -> Clustering {
        assert!(dim > 0 && points.len() % dim == 0);
        let rows = points.len() / dim;
        assert!(rows > 0, "k-means requires at least one point");

        let mut best: Option<Clustering> = None;
        for attempt in 0..self.restarts.max(1) {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(attempt as u64));
            let run = self.run_once(points, rows, dim, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        best.unwrap()
    }

    fn run_once(&self, points: &[f32], rows: usize, dim: usize, rng: &mut StdRng) -> Clustering {
        let dist_sq = get_euclidean_sq();
        let mut centers = self.seed_plus_plus(points, rows, dim, rng);
        let mut assignments = vec![0usize; rows];

        for _ in 0..self.max_iters {
            // Assignment step
            for r in 0..rows {
                let point = &points[r * dim..(r + 1) * dim];
                let (idx, _) = nearest_center(point, &centers, dim, dist_sq);
                assignments[r] = idx;
            }

            // Update step. Empty clusters keep their previous center.
            let mut sums = vec![0.0f32; self.k * dim];
            let mut counts = vec![0usize; self.k];
            for r in 0..rows {
                let c = assignments[r];
                counts[c] += 1;
                let point = &points[r * dim..(r + 1) * dim];
                for (acc, &v) in sums[c * dim..(c + 1) * dim].iter_mut().zip(point) {
                    *acc += v;
                }
            }
            for c in 0..self.k {
                if counts[c] > 0 {
                    let inv = 1.0 / counts[c] as f32;
                    for d in 0..dim {
                        centers[c * dim + d] = sums[c * dim + d] * inv;
                    }
                }
            }
        }

        // Final assignment against the last center update.
        let mut inertia = 0.0f64;
        for r in 0..rows {
            let point = &points[r * dim..(r + 1) * dim];
            let (idx, d) = nearest_center(point, &centers, dim, dist_sq);
            assignments[r] = idx;
            inertia += d as f64;
        }

        Clustering { centers, assignments, inertia }
    }

    /// kmeans++ seeding: first center uniform, the rest weighted by
    /// squared distance to the nearest chosen center. With fewer points
    /// than k, surplus centers are duplicates of random points.
    fn seed_plus_plus(&self, points: &[f32], rows: usize, dim: usize, rng: &mut StdRng) -> Vec<f32> {
        let dist_sq = get_euclidean_sq();
        let mut centers = Vec::with_capacity(self.k * dim);

        let first = rng.gen_range(0..rows);
        centers.extend_from_slice(&points[first * dim..(first + 1) * dim]);

        let mut min_d: Vec<f32> = (0..rows)
            .map(|r| unsafe { dist_sq(&points[r * dim..(r + 1) * dim], &centers[0..dim]) })
            .collect();

        while centers.len() < self.k * dim {
            let total: f64 = min_d.iter().map(|&d| d as f64).sum();
            let pick = if total <= f64::EPSILON {
                // All mass collapsed (duplicate points); fall back to uniform.
                rng.gen_range(0..rows)
            } else {
                let mut target = rng.gen::<f64>() * total;
                let mut chosen = rows - 1;
                for (r, &d) in min_d.iter().enumerate() {
                    target -= d as f64;
                    if target <= 0.0 {
                        chosen = r;
                        break;
                    }
                }
                chosen
            };

            let start = centers.len();
            centers.extend_from_slice(&points[pick * dim..(pick + 1) * dim]);
            let new_center = &centers[start..start + dim];
            for r in 0..rows {
                let d = unsafe { dist_sq(&points[r * dim..(r + 1) * dim], new_center) };
                if d < min_d[r] {
                    min_d[r] = d;
                }
            }
        }

        centers
    }
}

fn nearest_center(
    point: &[f32],
    centers: &[f32],
    dim: usize,
    dist_sq: crate::simd::DistanceFn,
) -> (usize, f32) {
    let k = centers.len() / dim;
    let mut best_idx = 0;
    let mut best_d = f32::MAX;
    for c in 0..k {
        let d = unsafe { dist_sq(point, &centers[c * dim..(c + 1) * dim]) };
        if d < best_d {
            best_d = d;
            best_idx = c;
        }
    }
    (best_idx, best_d)
}
