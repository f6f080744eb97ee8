use crate::core::codec::{CodecError, ProductQuantizer};
use crate::core::registry::{LutArena, LutHandle};

/// Scores pairs of codes against a shared lookup table.
///
/// Carries the handle and the calibration mode of the codec it was built
/// from, so the transform applied at scoring time always matches the
/// mode the table was trained with. Stateless beyond those two fields;
/// safe to use concurrently once tables are installed.
#[derive(Debug, Clone, Copy)]
pub struct CodeDistance {
    handle: LutHandle,
    calibrated: bool,
}

impl CodeDistance {
    /// Build a scorer for a trained (or loaded) codec.
    pub fn for_codec(codec: &ProductQuantizer) -> Result<Self, CodecError> {
        if !codec.is_trained() {
            return Err(CodecError::NotTrained);
        }
        Ok(Self {
            handle: codec.handle(),
            calibrated: codec.config().calibrate,
        })
    }

    pub fn calibrated(&self) -> bool {
        self.calibrated
    }

    /// Approximate distance between two codes: the sum of LUT lookups
    /// across subspaces. Raw (uncalibrated) tables additionally get the
    /// monotonic `-ln(sum + 1)` transform, turning an accumulated
    /// distance into a similarity-like score; calibrated tables already
    /// hold log-likelihood ratios and are summed as-is.
    pub fn compare(&self, arena: &LutArena, a: &[u8], b: &[u8]) -> Result<f32, CodecError> {
        let table = arena.table(self.handle).ok_or(CodecError::StaleHandle)?;
        let subspaces = table.subspace_count();
        if a.len() != subspaces {
            return Err(CodecError::CodeLengthMismatch { expected: subspaces, got: a.len() });
        }
        if b.len() != subspaces {
            return Err(CodecError::CodeLengthMismatch { expected: subspaces, got: b.len() });
        }

        let mut sum = 0.0f32;
        for s in 0..subspaces {
            sum += table.at(s, a[s] as usize, b[s] as usize);
        }

        if self.calibrated {
            Ok(sum)
        } else {
            Ok(-(sum + 1.0).ln())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{CodecConfig, ProductQuantizer};
    use crate::core::metric::Euclidean;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn trained_codec(arena: &mut LutArena) -> (ProductQuantizer, Vec<Vec<f32>>) {
        let mut rng = StdRng::seed_from_u64(19);
        let rows: Vec<Vec<f32>> = (0..400)
            .map(|_| (0..8).map(|_| rng.gen_range(-2.0..2.0)).collect())
            .collect();
        let mut codec = ProductQuantizer::new(CodecConfig::default(), arena);
        codec.train(&rows, None, &Euclidean, arena).unwrap();
        (codec, rows)
    }

    #[test]
    fn comparison_is_symmetric() {
        let mut arena = LutArena::new();
        let (codec, rows) = trained_codec(&mut arena);
        let scorer = CodeDistance::for_codec(&codec).unwrap();

        let a = codec.encode(&rows[3]).unwrap();
        let b = codec.encode(&rows[250]).unwrap();
        let ab = scorer.compare(&arena, &a, &b).unwrap();
        let ba = scorer.compare(&arena, &b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn raw_scores_decrease_with_distance() {
        let mut arena = LutArena::new();
        let (codec, rows) = trained_codec(&mut arena);
        let scorer = CodeDistance::for_codec(&codec).unwrap();

        let a = codec.encode(&rows[0]).unwrap();
        let near: Vec<f32> = rows[0].iter().map(|v| v + 0.01).collect();
        let far: Vec<f32> = rows[0].iter().map(|v| v + 3.0).collect();
        let near_code = codec.encode(&near).unwrap();
        let far_code = codec.encode(&far).unwrap();

        let s_near = scorer.compare(&arena, &a, &near_code).unwrap();
        let s_far = scorer.compare(&arena, &a, &far_code).unwrap();
        assert!(s_near >= s_far, "near {} should score above far {}", s_near, s_far);
    }

    #[test]
    fn rejects_mismatched_code_lengths() {
        let mut arena = LutArena::new();
        let (codec, rows) = trained_codec(&mut arena);
        let scorer = CodeDistance::for_codec(&codec).unwrap();
        let a = codec.encode(&rows[0]).unwrap();

        let err = scorer.compare(&arena, &a, &[0u8; 3]).unwrap_err();
        assert!(matches!(err, CodecError::CodeLengthMismatch { expected: 4, got: 3 }));
        let err = scorer.compare(&arena, &[0u8; 9], &a).unwrap_err();
        assert!(matches!(err, CodecError::CodeLengthMismatch { expected: 4, got: 9 }));
    }

    #[test]
    fn stale_handle_is_reported() {
        let mut arena = LutArena::new();
        let (codec, rows) = trained_codec(&mut arena);
        let scorer = CodeDistance::for_codec(&codec).unwrap();
        let a = codec.encode(&rows[0]).unwrap();

        arena.clear();
        let err = scorer.compare(&arena, &a, &a).unwrap_err();
        assert!(matches!(err, CodecError::StaleHandle));
    }

    #[test]
    fn untrained_codec_cannot_build_scorer() {
        let mut arena = LutArena::new();
        let codec = ProductQuantizer::new(CodecConfig::default(), &mut arena);
        assert!(matches!(CodeDistance::for_codec(&codec), Err(CodecError::NotTrained)));
    }
}
