use pq_codec::{
    load_model, save_model, CodeDistance, CodecConfig, Euclidean, LutArena, ProductQuantizer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();
    println!("=== PQ Codec Demo ===");

    // 1. Generate labeled training data (3 subjects, 8 dimensions)
    println!("\n[1] Generating training data...");
    let mut rng = StdRng::seed_from_u64(42);
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for i in 0..600 {
        let label = (i % 3) as i32;
        let base = label as f32 * 3.0;
        rows.push((0..8).map(|_| base + rng.gen_range(-0.5..0.5)).collect::<Vec<f32>>());
        labels.push(label);
    }
    println!("    {} vectors, 3 subjects.", rows.len());

    // 2. Train a calibrated codec (parallel subspace fan-out)
    println!("\n[2] Training codec (n=2, calibrated, parallel)...");
    let mut arena = LutArena::new();
    let config = CodecConfig { calibrate: true, parallel: true, ..Default::default() };
    let mut codec = ProductQuantizer::new(config, &mut arena);
    codec.train(&rows, Some(&labels), &Euclidean, &mut arena)?;
    let codebook = codec.codebook().unwrap();
    println!("    {} subspaces x 256 centers x width {}.", codebook.subspace_count(), codebook.width());

    // 3. Encode and score
    println!("\n[3] Encoding and scoring...");
    let same_subject = codec.encode(&rows[0])?; // label 0
    let same_again = codec.encode(&rows[3])?; // label 0
    let other_subject = codec.encode(&rows[1])?; // label 1

    let scorer = CodeDistance::for_codec(&codec)?;
    let genuine = scorer.compare(&arena, &same_subject, &same_again)?;
    let impostor = scorer.compare(&arena, &same_subject, &other_subject)?;
    println!("    Genuine score:  {:.4}", genuine);
    println!("    Impostor score: {:.4}", impostor);

    // 4. Save and reload
    let path = Path::new("demo_model.bin");
    println!("\n[4] Saving model to {:?} and reloading...", path);
    save_model(path, &codec, &arena)?;

    let mut fresh_arena = LutArena::new();
    let loaded = load_model(path, &mut fresh_arena)?;
    let scorer = CodeDistance::for_codec(&loaded)?;
    let code_a = loaded.encode(&rows[0])?;
    let code_b = loaded.encode(&rows[3])?;
    println!("    Reloaded genuine score: {:.4}", scorer.compare(&fresh_arena, &code_a, &code_b)?);

    println!("\n=== Demo Complete ===");
    Ok(())
}
