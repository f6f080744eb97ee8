use crate::simd;

/// Inter-center distance used when building the lookup tables.
/// Passed explicitly into training so callers can swap the metric
/// without touching the trainer.
pub trait Metric: Sync {
    fn compare(&self, a: &[f32], b: &[f32]) -> f32;
    fn name(&self) -> &'static str;
}

/// L2 distance, the default. Dispatches to the AVX2 kernel when available.
pub struct Euclidean;

impl Metric for Euclidean {
    fn compare(&self, a: &[f32], b: &[f32]) -> f32 {
        unsafe { simd::get_euclidean_distance()(a, b) }
    }

    fn name(&self) -> &'static str {
        "euclidean"
    }
}

/// L1 distance.
pub struct Cityblock;

impl Metric for Cityblock {
    fn compare(&self, a: &[f32], b: &[f32]) -> f32 {
        simd::distance::cityblock_distance(a, b)
    }

    fn name(&self) -> &'static str {
        "cityblock"
    }
}
