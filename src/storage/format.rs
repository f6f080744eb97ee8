use bytemuck::{Pod, Zeroable};

pub const MAGIC: [u8; 8] = *b"PQLUT1\0\0";
pub const FORMAT_VERSION: u32 = 1;

/// On-disk model header. A model file is one codec instance: this
/// header, then the codebook floats (subspaces * 256 * width), then the
/// lookup-table floats (subspaces * 65536). The checksum covers
/// everything after the header.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ModelHeader {
    pub magic: [u8; 8],
    pub version: u32,
    /// Subspace count (D / width).
    pub subspaces: u32,
    /// Subspace width n.
    pub width: u32,
    /// 1 if the table holds log-likelihood ratios. Persisted so a loaded
    /// codec always scores in the mode it was trained with.
    pub calibrated: u32,
    pub codebook_offset: u64,
    pub lut_offset: u64,
    pub checksum: u64,
    pub padding: [u64; 10], // Pad to 128 bytes.
}

impl ModelHeader {
    pub fn codebook_len(&self) -> usize {
        self.subspaces as usize * 256 * self.width as usize
    }

    pub fn lut_len(&self) -> usize {
        self.subspaces as usize * 256 * 256
    }
}

// Ensure ModelHeader is 128 bytes
const _: () = assert!(std::mem::size_of::<ModelHeader>() == 128);
