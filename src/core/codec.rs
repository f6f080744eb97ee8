use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::calibration::calibrate_lut;
use crate::core::kmeans::KMeans;
use crate::core::metric::Metric;
use crate::core::registry::{DistanceTable, LutArena, LutHandle, CENTERS, LUT_CELLS};
use crate::simd::get_euclidean_sq;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("dimensionality {dim} is not divisible by subspace width {width}")]
    IndivisibleDimension { dim: usize, width: usize },
    #[error("training requires at least one sample")]
    EmptyTrainingSet,
    #[error("training row {row} has {got} columns, expected {expected}")]
    RaggedTrainingRow { row: usize, expected: usize, got: usize },
    #[error("calibration requires one label per training row ({expected} rows, {got} labels)")]
    LabelCountMismatch { expected: usize, got: usize },
    #[error("codec has not been trained or loaded")]
    NotTrained,
    #[error("vector has {got} dimensions, codebook expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("code has {got} bytes, table expects {expected}")]
    CodeLengthMismatch { expected: usize, got: usize },
    #[error("lookup table handle is stale or was never filled")]
    StaleHandle,
}

/// Training-time options. The distance metric is not part of the config;
/// it is passed into `train` as an explicit capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Subspace width n. Each code byte covers n contiguous dimensions.
    pub subspace_width: usize,
    /// Rescale tables into log-likelihood ratios after clustering.
    pub calibrate: bool,
    /// One worker task per subspace during training.
    pub parallel: bool,
    /// Lloyd iteration bound per k-means attempt.
    pub kmeans_iters: usize,
    /// Best-of-N k-means restarts.
    pub kmeans_restarts: usize,
    /// Base RNG seed. Subspace s derives its own seed from this, so
    /// parallel and sequential training agree bit for bit.
    pub seed: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            subspace_width: 2,
            calibrate: false,
            parallel: false,
            kmeans_iters: 10,
            kmeans_restarts: 3,
            seed: 7,
        }
    }
}

/// Trained centers: one entry per subspace, each a flat 256 x width
/// block of floats. Immutable once training completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    width: usize,
    subspaces: Vec<Vec<f32>>,
}

impl Codebook {
    pub(crate) fn from_parts(width: usize, subspaces: Vec<Vec<f32>>) -> Self {
        debug_assert!(subspaces.iter().all(|s| s.len() == CENTERS * width));
        Self { width, subspaces }
    }

    pub fn subspace_count(&self) -> usize {
        self.subspaces.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Full input dimensionality this codebook was trained for.
    pub fn dimension(&self) -> usize {
        self.subspaces.len() * self.width
    }

    #[inline]
    pub fn center(&self, subspace: usize, idx: usize) -> &[f32] {
        &self.subspaces[subspace][idx * self.width..(idx + 1) * self.width]
    }

    /// All centers of one subspace, flat row-major.
    pub fn centers(&self, subspace: usize) -> &[f32] {
        &self.subspaces[subspace]
    }
}

/// Per-subspace training output, assembled on the calling thread after
/// the fan-out joins.
struct SubspaceModel {
    centers: Vec<f32>,
    lut: Vec<f32>,
}

/// Product-quantization codec: trains one 256-center sub-model per
/// subspace, encodes vectors to one byte per subspace and publishes the
/// pairwise center-distance table to the shared arena under this
/// instance's handle.
pub struct ProductQuantizer {
    config: CodecConfig,
    handle: LutHandle,
    codebook: Option<Codebook>,
}

impl ProductQuantizer {
    /// Registers an arena slot for this instance. The slot is filled by
    /// `train` (or by the model loader).
    pub fn new(config: CodecConfig, arena: &mut LutArena) -> Self {
        let handle = arena.register();
        Self { config, handle, codebook: None }
    }

    pub(crate) fn from_parts(config: CodecConfig, handle: LutHandle, codebook: Codebook) -> Self {
        Self { config, handle, codebook: Some(codebook) }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn handle(&self) -> LutHandle {
        self.handle
    }

    pub fn codebook(&self) -> Option<&Codebook> {
        self.codebook.as_ref()
    }

    pub fn is_trained(&self) -> bool {
        self.codebook.is_some()
    }

    /// Train on a rectangular matrix of rows. `labels` pairs each row
    /// with a subject id and is only consulted (and required) when
    /// calibration is enabled.
    ///
    /// Subspaces are independent; with `parallel` enabled each one
    /// trains on its own rayon task and the call joins all of them
    /// before touching the arena. Nothing is installed unless every
    /// subspace succeeds, so a failed precondition leaves no partial
    /// state behind.
    pub fn train(
        &mut self,
        rows: &[Vec<f32>],
        labels: Option<&[i32]>,
        metric: &dyn Metric,
        arena: &mut LutArena,
    ) -> Result<(), CodecError> {
        if rows.is_empty() {
            return Err(CodecError::EmptyTrainingSet);
        }
        let dim = rows[0].len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(CodecError::RaggedTrainingRow { row: i, expected: dim, got: row.len() });
            }
        }
        let width = self.config.subspace_width;
        if dim == 0 || dim % width != 0 {
            return Err(CodecError::IndivisibleDimension { dim, width });
        }
        if self.config.calibrate {
            let got = labels.map_or(0, <[i32]>::len);
            if got != rows.len() {
                return Err(CodecError::LabelCountMismatch { expected: rows.len(), got });
            }
        }

        let subspaces = dim / width;
        info!(
            rows = rows.len(),
            dim,
            subspaces,
            width,
            metric = metric.name(),
            calibrate = self.config.calibrate,
            parallel = self.config.parallel,
            "training product quantizer"
        );

        // Contiguous per-subspace training slices.
        let subdata: Vec<Vec<f32>> = (0..subspaces)
            .map(|s| {
                let mut flat = Vec::with_capacity(rows.len() * width);
                for row in rows {
                    flat.extend_from_slice(&row[s * width..(s + 1) * width]);
                }
                flat
            })
            .collect();

        let config = &self.config;
        let train_one = |s: usize| -> SubspaceModel {
            let kmeans = KMeans::new(CENTERS, config.kmeans_iters, config.kmeans_restarts);
            let seed = config.seed ^ s as u64;
            let clustering = kmeans.fit(&subdata[s], width, seed);

            let mut lut = vec![0.0f32; LUT_CELLS];
            for i in 0..CENTERS {
                let center_i = &clustering.centers[i * width..(i + 1) * width];
                for j in 0..CENTERS {
                    let center_j = &clustering.centers[j * width..(j + 1) * width];
                    lut[i * CENTERS + j] = metric.compare(center_i, center_j);
                }
            }

            if config.calibrate {
                calibrate_lut(&mut lut, &clustering.assignments, labels.unwrap(), seed);
            }

            debug!(subspace = s, inertia = clustering.inertia, "subspace trained");
            SubspaceModel { centers: clustering.centers, lut }
        };

        let models: Vec<SubspaceModel> = if self.config.parallel {
            (0..subspaces).into_par_iter().map(train_one).collect()
        } else {
            (0..subspaces).map(train_one).collect()
        };

        let mut table = DistanceTable::new(subspaces);
        let mut centers = Vec::with_capacity(subspaces);
        for (s, model) in models.into_iter().enumerate() {
            table.row_mut(s).copy_from_slice(&model.lut);
            centers.push(model.centers);
        }

        arena.install(self.handle, table);
        self.codebook = Some(Codebook::from_parts(width, centers));
        info!(subspaces, "training complete");
        Ok(())
    }

    /// Map a vector to its code: per subspace, the index of the nearest
    /// center under squared Euclidean distance. The first center
    /// achieving the minimum wins, so encoding is deterministic.
    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>, CodecError> {
        let codebook = self.codebook.as_ref().ok_or(CodecError::NotTrained)?;
        if vector.len() != codebook.dimension() {
            return Err(CodecError::DimensionMismatch {
                expected: codebook.dimension(),
                got: vector.len(),
            });
        }

        let dist_sq = get_euclidean_sq();
        let width = codebook.width();
        let mut code = Vec::with_capacity(codebook.subspace_count());
        for s in 0..codebook.subspace_count() {
            let slice = &vector[s * width..(s + 1) * width];
            let mut best_idx = 0u8;
            let mut best_d = f32::MAX;
            for idx in 0..CENTERS {
                let d = unsafe { dist_sq(slice, codebook.center(s, idx)) };
                if d < best_d {
                    best_d = d;
                    best_idx = idx as u8;
                }
            }
            code.push(best_idx);
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evaluator::CodeDistance;
    use crate::core::metric::Euclidean;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_rows(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect()
    }

    #[test]
    fn trains_expected_codebook_shape() {
        let rows = random_rows(400, 8, 11);
        let mut arena = LutArena::new();
        let mut codec = ProductQuantizer::new(CodecConfig::default(), &mut arena);
        codec.train(&rows, None, &Euclidean, &mut arena).unwrap();

        let codebook = codec.codebook().unwrap();
        assert_eq!(codebook.subspace_count(), 4);
        assert_eq!(codebook.width(), 2);
        assert_eq!(codebook.dimension(), 8);
        for s in 0..4 {
            assert_eq!(codebook.centers(s).len(), CENTERS * 2);
        }

        let table = arena.table(codec.handle()).unwrap();
        assert_eq!(table.subspace_count(), 4);
    }

    #[test]
    fn encode_emits_one_byte_per_subspace_deterministically() {
        let rows = random_rows(300, 8, 5);
        let mut arena = LutArena::new();
        let mut codec = ProductQuantizer::new(CodecConfig::default(), &mut arena);
        codec.train(&rows, None, &Euclidean, &mut arena).unwrap();

        let code = codec.encode(&rows[17]).unwrap();
        assert_eq!(code.len(), 4);
        assert_eq!(code, codec.encode(&rows[17]).unwrap());
    }

    #[test]
    fn indivisible_dimensionality_fails_before_training() {
        let rows = random_rows(50, 10, 2);
        let mut arena = LutArena::new();
        let mut codec = ProductQuantizer::new(
            CodecConfig { subspace_width: 3, ..Default::default() },
            &mut arena,
        );
        let err = codec.train(&rows, None, &Euclidean, &mut arena).unwrap_err();
        assert!(matches!(err, CodecError::IndivisibleDimension { dim: 10, width: 3 }));
        assert!(!codec.is_trained());
        assert!(arena.table(codec.handle()).is_none());
    }

    #[test]
    fn encode_before_training_fails_fast() {
        let mut arena = LutArena::new();
        let codec = ProductQuantizer::new(CodecConfig::default(), &mut arena);
        assert!(matches!(codec.encode(&[0.0; 8]), Err(CodecError::NotTrained)));
    }

    #[test]
    fn encode_rejects_wrong_dimensionality() {
        let rows = random_rows(300, 8, 5);
        let mut arena = LutArena::new();
        let mut codec = ProductQuantizer::new(CodecConfig::default(), &mut arena);
        codec.train(&rows, None, &Euclidean, &mut arena).unwrap();

        let err = codec.encode(&[0.0; 6]).unwrap_err();
        assert!(matches!(err, CodecError::DimensionMismatch { expected: 8, got: 6 }));
    }

    #[test]
    fn calibration_requires_labels() {
        let rows = random_rows(40, 4, 3);
        let mut arena = LutArena::new();
        let mut codec = ProductQuantizer::new(
            CodecConfig { calibrate: true, ..Default::default() },
            &mut arena,
        );
        let err = codec.train(&rows, None, &Euclidean, &mut arena).unwrap_err();
        assert!(matches!(err, CodecError::LabelCountMismatch { expected: 40, got: 0 }));
    }

    #[test]
    fn parallel_and_sequential_training_agree() {
        let rows = random_rows(500, 8, 23);

        let mut arena_seq = LutArena::new();
        let mut seq = ProductQuantizer::new(
            CodecConfig { parallel: false, ..Default::default() },
            &mut arena_seq,
        );
        seq.train(&rows, None, &Euclidean, &mut arena_seq).unwrap();

        let mut arena_par = LutArena::new();
        let mut par = ProductQuantizer::new(
            CodecConfig { parallel: true, ..Default::default() },
            &mut arena_par,
        );
        par.train(&rows, None, &Euclidean, &mut arena_par).unwrap();

        assert_eq!(seq.codebook(), par.codebook());
        assert_eq!(
            arena_seq.table(seq.handle()).unwrap(),
            arena_par.table(par.handle()).unwrap()
        );
    }

    #[test]
    fn calibrated_training_yields_finite_table_that_differs_from_raw() {
        let mut rng = StdRng::seed_from_u64(31);
        // Three labeled clusters in 8 dimensions.
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..1000 {
            let label = (i % 3) as i32;
            let base = label as f32 * 4.0;
            rows.push((0..8).map(|_| base + rng.gen_range(-0.5..0.5)).collect::<Vec<f32>>());
            labels.push(label);
        }

        let mut arena = LutArena::new();
        let mut raw = ProductQuantizer::new(CodecConfig::default(), &mut arena);
        raw.train(&rows, None, &Euclidean, &mut arena).unwrap();

        let mut calibrated = ProductQuantizer::new(
            CodecConfig { calibrate: true, ..Default::default() },
            &mut arena,
        );
        calibrated
            .train(&rows, Some(&labels), &Euclidean, &mut arena)
            .unwrap();

        let raw_table = arena.table(raw.handle()).unwrap();
        let cal_table = arena.table(calibrated.handle()).unwrap();
        assert!(cal_table.as_slice().iter().all(|v| v.is_finite()));
        assert_ne!(raw_table.as_slice(), cal_table.as_slice());
    }

    #[test]
    fn self_comparison_scores_zero_on_raw_tables() {
        let rows = random_rows(300, 8, 77);
        let mut arena = LutArena::new();
        let mut codec = ProductQuantizer::new(CodecConfig::default(), &mut arena);
        codec.train(&rows, None, &Euclidean, &mut arena).unwrap();

        let code = codec.encode(&rows[0]).unwrap();
        let scorer = CodeDistance::for_codec(&codec).unwrap();
        let self_score = scorer.compare(&arena, &code, &code).unwrap();
        // table[s][i][i] = dist(center_i, center_i) = 0, so -ln(0 + 1) = 0.
        assert!(self_score.abs() < 1e-6);
    }
}
