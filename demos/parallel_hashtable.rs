//! Driver for the two-phase insert/lookup run: generates random keys, times
//! both phases, and reports how many keys were lost.
//!
//! ```text
//! cargo run --release --example parallel_hashtable -- --threads 8
//! ```

use std::process;
use std::time::Instant;

use clap::Parser;
use rand::prelude::*;
use stripemap_rs::{run_insert_phase, run_lookup_phase, StripeMap};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Two-phase striped hash table benchmark")]
struct Args {
    /// Number of worker threads per phase
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Number of random keys to insert and look up
    #[arg(short, long, default_value_t = 100_000)]
    keys: usize,

    /// Number of buckets (stripe locks)
    #[arg(short, long, default_value_t = 5)]
    buckets: usize,

    /// RNG seed; omit for a random run
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let keys: Vec<i64> = (0..args.keys).map(|_| rng.gen()).collect();

    let table = match StripeMap::with_buckets(args.buckets) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let start = Instant::now();
    if let Err(e) = run_insert_phase(&table, &keys, args.threads) {
        eprintln!("{}", e);
        process::exit(1);
    }
    println!(
        "[main] Inserted {} keys in {:.6} seconds",
        keys.len(),
        start.elapsed().as_secs_f64()
    );

    let start = Instant::now();
    let stats = match run_lookup_phase(&table, &keys, args.threads) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    for (t, lost) in stats.per_worker.iter().enumerate() {
        println!("[thread {}] {} keys lost!", t, lost);
    }
    println!(
        "[main] Retrieved {}/{} keys in {:.6} seconds",
        keys.len() as u64 - stats.total_lost,
        keys.len(),
        start.elapsed().as_secs_f64()
    );
}
