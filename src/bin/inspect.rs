use clap::Parser;
use pq_codec::{load_model, LutArena};
use serde::Serialize;
use std::path::PathBuf;

/// Print the contents of a persisted codec model.
#[derive(Parser)]
struct Args {
    /// Path to the model file
    model: PathBuf,
    /// Emit a JSON summary instead of plain text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ModelSummary {
    subspaces: usize,
    width: usize,
    dimension: usize,
    calibrated: bool,
    lut_cells: usize,
    lut_min: f32,
    lut_max: f32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut arena = LutArena::new();
    let codec = load_model(&args.model, &mut arena)?;
    let codebook = codec.codebook().unwrap();
    let table = arena.table(codec.handle()).unwrap();

    let lut = table.as_slice();
    let lut_min = lut.iter().copied().fold(f32::INFINITY, f32::min);
    let lut_max = lut.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let summary = ModelSummary {
        subspaces: codebook.subspace_count(),
        width: codebook.width(),
        dimension: codebook.dimension(),
        calibrated: codec.config().calibrate,
        lut_cells: lut.len(),
        lut_min,
        lut_max,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Model: {:?}", args.model);
        println!("Subspaces:  {}", summary.subspaces);
        println!("Width:      {}", summary.width);
        println!("Dimension:  {}", summary.dimension);
        println!("Calibrated: {}", summary.calibrated);
        println!("LUT cells:  {} (min {:.4}, max {:.4})", summary.lut_cells, lut_min, lut_max);
    }
    Ok(())
}
