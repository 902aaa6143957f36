//! Track F0 in WAV files and print one line per frame.
//!
//! Usage: cargo run --example track_wav -- <FILES>... [--min <HZ>] [--max <HZ>]
//!
//! Set RUST_LOG=rapt=debug to see the pipeline stages.

use std::path::{Path, PathBuf};

use clap::Parser;

use rapt::{AudioSignal, RaptParams};
use tracing_subscriber::EnvFilter;

fn track_file(path: &Path, params: &RaptParams) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{}", "=".repeat(60));
    println!("Tracking: {}", path.display());
    println!("{}", "=".repeat(60));

    let signal = AudioSignal::from_file(path)?;
    println!("{}", signal);

    let track = rapt::estimate_pitch(&signal, params)?;
    for (time, value) in track.times().iter().zip(track.values().iter()) {
        if *value > 0.0 {
            println!("{:8.3}  {:7.2} Hz", time, value);
        } else {
            println!("{:8.3}  unvoiced", time);
        }
    }

    let voiced: Vec<f64> = track.values().iter().filter(|&&v| v > 0.0).copied().collect();
    let mean_f0 = if voiced.is_empty() {
        f64::NAN
    } else {
        voiced.iter().sum::<f64>() / voiced.len() as f64
    };
    println!(
        "{} frames, {} voiced, mean F0={:.1} Hz",
        track.n_frames(),
        track.voiced_count(),
        mean_f0
    );

    Ok(())
}

#[derive(Debug, Parser)]
#[command(name = "track_wav")]
#[command(about = "Track F0 in WAV files with RAPT", long_about = None)]
struct Args {
    /// WAV files to track.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Lowest F0 searched for, in Hz.
    #[arg(long)]
    min: Option<f64>,

    /// Highest F0 searched for, in Hz.
    #[arg(long)]
    max: Option<f64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut params = RaptParams::default();
    if let Some(hz) = args.min {
        params.minimum_allowed_freq = hz;
    }
    if let Some(hz) = args.max {
        params.maximum_allowed_freq = hz;
    }

    let mut failed = 0;
    for file in &args.files {
        if let Err(e) = track_file(file, &params) {
            println!("  FAILED: {} - {}", file.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_files_and_range() {
        let args = Args::try_parse_from(["track_wav", "a.wav", "b.wav", "--min", "60", "--max", "400"]).unwrap();
        assert_eq!(args.files, vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")]);
        assert_eq!(args.min, Some(60.0));
        assert_eq!(args.max, Some(400.0));
    }

    #[test]
    fn range_is_optional() {
        let args = Args::try_parse_from(["track_wav", "a.wav"]).unwrap();
        assert_eq!(args.min, None);
        assert_eq!(args.max, None);
    }

    #[test]
    fn requires_a_file() {
        assert!(Args::try_parse_from(["track_wav"]).is_err());
        assert!(Args::try_parse_from(["track_wav", "a.wav", "--min", "low"]).is_err());
    }
}
