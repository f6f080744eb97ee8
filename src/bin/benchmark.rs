use clap::Parser;
use hdrhistogram::Histogram;
use pq_codec::core::runtime::RuntimeConfig;
use pq_codec::{CodeDistance, CodecConfig, Euclidean, LutArena, ProductQuantizer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Train a codec on random data and report encode/compare latency.
#[derive(Parser)]
struct Args {
    /// Training rows
    #[arg(long, default_value_t = 2000)]
    rows: usize,
    /// Input dimensionality
    #[arg(long, default_value_t = 64)]
    dim: usize,
    /// Subspace width
    #[arg(long, default_value_t = 2)]
    width: usize,
    /// Encode/compare iterations to sample
    #[arg(long, default_value_t = 10_000)]
    iters: usize,
    /// Train subspaces in parallel on a core-pinned pool
    #[arg(long)]
    parallel: bool,
}

fn percentiles(label: &str, hist: &Histogram<u64>) {
    println!(
        "{:<10} p50 {:>6} ns | p99 {:>7} ns | p99.9 {:>8} ns | max {:>8} ns",
        label,
        hist.value_at_quantile(0.50),
        hist.value_at_quantile(0.99),
        hist.value_at_quantile(0.999),
        hist.max()
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    if args.parallel {
        RuntimeConfig::init_pinned_pool()?;
    }

    let mut rng = StdRng::seed_from_u64(99);
    let rows: Vec<Vec<f32>> = (0..args.rows)
        .map(|_| (0..args.dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();

    let mut arena = LutArena::new();
    let config = CodecConfig {
        subspace_width: args.width,
        parallel: args.parallel,
        ..Default::default()
    };
    let mut codec = ProductQuantizer::new(config, &mut arena);

    let start = Instant::now();
    codec.train(&rows, None, &Euclidean, &mut arena)?;
    println!(
        "Trained {} rows x {} dims ({} subspaces) in {:?}",
        args.rows,
        args.dim,
        args.dim / args.width,
        start.elapsed()
    );

    let mut encode_hist = Histogram::<u64>::new(3)?;
    let mut compare_hist = Histogram::<u64>::new(3)?;
    let scorer = CodeDistance::for_codec(&codec)?;

    let mut codes = Vec::with_capacity(args.iters);
    for i in 0..args.iters {
        let row = &rows[i % rows.len()];
        let t = Instant::now();
        let code = codec.encode(row)?;
        encode_hist.record(t.elapsed().as_nanos() as u64)?;
        codes.push(code);
    }

    let mut sink = 0.0f32;
    for i in 0..args.iters {
        let a = &codes[i % codes.len()];
        let b = &codes[(i * 7 + 1) % codes.len()];
        let t = Instant::now();
        sink += scorer.compare(&arena, a, b)?;
        compare_hist.record(t.elapsed().as_nanos() as u64)?;
    }

    percentiles("encode", &encode_hist);
    percentiles("compare", &compare_hist);
    println!("(checksum {sink:.3})");
    Ok(())
}
