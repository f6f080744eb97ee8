pub mod distance;
pub mod avx2;

pub type DistanceFn = unsafe fn(&[f32], &[f32]) -> f32;

pub fn get_euclidean_distance() -> DistanceFn {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return avx2::euclidean_distance_avx2;
        }
    }

    // Fallback
    wrapper_scalar
}

/// Squared variant for argmin paths (k-means assignment, encoding).
/// Ordering is identical to the sqrt'd distance, so the sqrt is skipped.
pub fn get_euclidean_sq() -> DistanceFn {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return avx2::euclidean_sq_avx2;
        }
    }

    wrapper_scalar_sq
}

unsafe fn wrapper_scalar(a: &[f32], b: &[f32]) -> f32 {
    distance::euclidean_distance(a, b)
}

unsafe fn wrapper_scalar_sq(a: &[f32], b: &[f32]) -> f32 {
    distance::euclidean_sq(a, b)
}
