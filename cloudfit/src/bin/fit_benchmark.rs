//! Fit benchmark on synthetic Fermi gas images
//!
//! Renders noisy ideal Fermi clouds with a known temperature and atom number,
//! runs the full analysis on each and reports the recovered values and timing.
//!
//! Usage:
//! ```
//! cargo run --release --bin fit_benchmark -- [OPTIONS]
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use rayon::prelude::*;

use cloudfit::fit::fugacity_from_temperature;
use cloudfit::image_proc::test_patterns::{add_gaussian_noise, cloud_od_image, transmission_from_od};
use cloudfit::{fit_image, AnalysisConfig, FitModel, Point};

/// Command line arguments for the fit benchmark
#[derive(Parser, Debug)]
#[command(
    name = "Fit Benchmark",
    about = "Fits synthetic ideal Fermi gas images and reports accuracy and timing",
    long_about = None
)]
struct Args {
    /// Number of synthetic images
    #[arg(short = 'n', long, default_value_t = 16)]
    num_images: usize,

    /// Image size in pixels (square)
    #[arg(long, default_value_t = 201)]
    size: usize,

    /// Peak optical density of the cloud
    #[arg(long, default_value_t = 0.8)]
    n0: f64,

    /// Cloud radius in pixels
    #[arg(long, default_value_t = 25.0)]
    r_cloud: f64,

    /// True T/T_F of the rendered clouds
    #[arg(long, default_value_t = 0.15)]
    t_over_tf: f64,

    /// Standard deviation of the transmission noise
    #[arg(long, default_value_t = 0.01)]
    noise: f64,

    /// Seed of the first image; image i uses seed + i
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// JSON analysis configuration; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fit images one after another instead of in parallel
    #[arg(long)]
    serial: bool,

    /// Worker threads (0 = rayon default)
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

struct Outcome {
    t_over_tf: f64,
    atom_number: f64,
    converged: bool,
    elapsed: Duration,
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            AnalysisConfig::from_json_str(&json)?
        }
        None => AnalysisConfig::default(),
    };

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()?;
    }

    let q = fugacity_from_temperature(args.t_over_tf)?;
    let truth = FitModel::ideal_fermi(args.n0, q, args.r_cloud);
    let expected_n = config.pixel_size.powi(2) / config.cross_section * truth.integrated_density();
    let c = (args.size / 2) as f64;
    let od = cloud_od_image((args.size, args.size), Point::new(c, c), &truth, 1.0);
    let clean = transmission_from_od(&od);

    println!("Fit Benchmark");
    println!("=============");
    println!("Images: {} of {}x{} px", args.num_images, args.size, args.size);
    println!("Truth: T/T_F = {:.4}, q = {q:.4}, N = {expected_n:.4e}", args.t_over_tf);
    println!("Noise: {:.4}", args.noise);
    println!("Parallel execution: {}", !args.serial);

    let run = |i: usize| -> anyhow::Result<Outcome> {
        let image = add_gaussian_noise(&clean, args.noise, args.seed + i as u64)?;
        let start = Instant::now();
        let result = fit_image(&image.view(), &config)?;
        Ok(Outcome {
            t_over_tf: result.t_over_tf,
            atom_number: result.atom_number,
            converged: result.fit.converged,
            elapsed: start.elapsed(),
        })
    };

    let wall = Instant::now();
    let outcomes: Vec<Outcome> = if args.serial {
        (0..args.num_images).map(run).collect::<anyhow::Result<_>>()?
    } else {
        (0..args.num_images)
            .into_par_iter()
            .map(run)
            .collect::<anyhow::Result<_>>()?
    };
    let wall = wall.elapsed();

    if outcomes.is_empty() {
        println!("No images fitted");
        return Ok(());
    }

    let temps: Vec<f64> = outcomes.iter().map(|o| o.t_over_tf).collect();
    let numbers: Vec<f64> = outcomes.iter().map(|o| o.atom_number).collect();
    let mut timings: Vec<Duration> = outcomes.iter().map(|o| o.elapsed).collect();
    timings.sort();
    let converged = outcomes.iter().filter(|o| o.converged).count();

    let (t_mean, t_std) = mean_and_std(&temps);
    let (n_mean, n_std) = mean_and_std(&numbers);
    let median_ms = timings[timings.len() / 2].as_secs_f64() * 1e3;
    let max_ms = timings[timings.len() - 1].as_secs_f64() * 1e3;

    println!("\n========== FIT RESULTS ==========");
    println!("  Converged:  {converged}/{}", outcomes.len());
    println!("  T/T_F:      {t_mean:.4} ± {t_std:.4} (truth {:.4})", args.t_over_tf);
    println!("  N:          {n_mean:.4e} ± {n_std:.2e} (truth {expected_n:.4e})");
    println!("  N error:    {:+.2}%", 100.0 * (n_mean / expected_n - 1.0));
    println!("\nTiming:");
    println!("  Median fit: {median_ms:>8.2} ms");
    println!("  Max fit:    {max_ms:>8.2} ms");
    println!("  Wall clock: {:>8.2} ms", wall.as_secs_f64() * 1e3);
    println!("=================================\n");

    Ok(())
}
