use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use bytemuck::bytes_of;
use crc32fast::Hasher;
use memmap2::Mmap;
use thiserror::Error;
use tracing::info;

use crate::core::codec::{Codebook, CodecConfig, CodecError, ProductQuantizer};
use crate::core::registry::{DistanceTable, LutArena, CENTERS};
use crate::storage::format::{ModelHeader, FORMAT_VERSION, MAGIC};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u32),
    #[error("file too small or section offsets out of bounds")]
    FileTooSmall,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Persist one codec as an atomic unit: header, codebook floats, then
/// lookup-table floats, with a crc32 over the payload patched into the
/// header once everything is on disk.
pub fn save_model(
    path: &Path,
    codec: &ProductQuantizer,
    arena: &LutArena,
) -> Result<(), ModelError> {
    let codebook = codec.codebook().ok_or(CodecError::NotTrained)?;
    let table = arena.table(codec.handle()).ok_or(CodecError::StaleHandle)?;

    let header_size = std::mem::size_of::<ModelHeader>();
    let codebook_bytes = codebook.subspace_count() * CENTERS * codebook.width() * 4;

    let mut header = ModelHeader {
        magic: MAGIC,
        version: FORMAT_VERSION,
        subspaces: codebook.subspace_count() as u32,
        width: codebook.width() as u32,
        calibrated: codec.config().calibrate as u32,
        codebook_offset: header_size as u64,
        lut_offset: (header_size + codebook_bytes) as u64,
        checksum: 0,
        padding: [0; 10],
    };

    let mut file = File::create(path)?;
    file.write_all(bytes_of(&header))?;
    let mut hasher = Hasher::new();

    for s in 0..codebook.subspace_count() {
        let bytes = bytemuck::cast_slice(codebook.centers(s));
        file.write_all(bytes)?;
        hasher.update(bytes);
    }

    let bytes = bytemuck::cast_slice(table.as_slice());
    file.write_all(bytes)?;
    hasher.update(bytes);

    header.checksum = hasher.finalize() as u64;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bytes_of(&header))?;

    info!(?path, subspaces = codebook.subspace_count(), "model saved");
    Ok(())
}

/// Load a model file back into a ready-to-use codec.
///
/// The returned codec gets a fresh handle in `arena`; slot identity is
/// a runtime concept, so load order never has to match save order. The
/// calibrated flag comes from the header, keeping scoring in the mode
/// the table was trained with.
pub fn load_model(path: &Path, arena: &mut LutArena) -> Result<ProductQuantizer, ModelError> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    let header_size = std::mem::size_of::<ModelHeader>();
    if mmap.len() < header_size {
        return Err(ModelError::FileTooSmall);
    }

    let header = bytemuck::from_bytes::<ModelHeader>(&mmap[0..header_size]);
    if header.magic != MAGIC {
        return Err(ModelError::InvalidMagic);
    }
    if header.version != FORMAT_VERSION {
        return Err(ModelError::UnsupportedVersion(header.version));
    }
    // Sanity limits keep the section arithmetic below overflow-free.
    if header.subspaces == 0
        || header.width == 0
        || header.subspaces > 65_536
        || header.width > 65_536
    {
        return Err(ModelError::FileTooSmall);
    }

    let codebook_start = header.codebook_offset as usize;
    let lut_start = header.lut_offset as usize;
    let lut_end = lut_start + header.lut_len() * 4;
    if codebook_start != header_size
        || lut_start != codebook_start + header.codebook_len() * 4
        || lut_end != mmap.len()
    {
        return Err(ModelError::FileTooSmall);
    }

    let mut hasher = Hasher::new();
    hasher.update(&mmap[header_size..]);
    if hasher.finalize() as u64 != header.checksum {
        return Err(ModelError::ChecksumMismatch);
    }

    let width = header.width as usize;
    let subspaces = header.subspaces as usize;

    let center_floats: &[f32] = bytemuck::cast_slice(&mmap[codebook_start..lut_start]);
    let centers: Vec<Vec<f32>> = center_floats
        .chunks(CENTERS * width)
        .map(<[f32]>::to_vec)
        .collect();
    let codebook = Codebook::from_parts(width, centers);

    let lut_floats: &[f32] = bytemuck::cast_slice(&mmap[lut_start..lut_end]);
    let table = DistanceTable::from_raw(subspaces, lut_floats.to_vec());

    let handle = arena.register();
    arena.install(handle, table);

    let config = CodecConfig {
        subspace_width: width,
        calibrate: header.calibrated == 1,
        ..Default::default()
    };

    info!(?path, subspaces, width, calibrated = header.calibrated == 1, "model loaded");
    Ok(ProductQuantizer::from_parts(config, handle, codebook))
}
