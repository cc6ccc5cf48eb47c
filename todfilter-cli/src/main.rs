mod common;
mod plot;
mod util;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use todfilter_core::{
    QualityConfig, QualityReport, WhitenConfig, WhiteningScale, WienerConfig, assess_whitening,
    assess_wiener, format_report, whiten, wiener_filter,
};

use crate::common::gen_output_fn;
use crate::util::{load_config, read_samples, write_json, write_samples};

#[derive(Parser, Debug)]
#[command(name = "todfilter", version, about = "Whiten or Wiener-filter time-ordered data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten a white + 1/f noise spectrum to its white floor.
    Whiten(WhitenArgs),
    /// Suppress 1/f noise fitted on the high-frequency tail.
    Wiener(WienerArgs),
}

#[derive(Args, Debug)]
struct SharedArgs {
    /// Input files: numbers separated by whitespace, commas or newlines.
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// JSON config; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory (defaults to each input's directory).
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WhitenArgs {
    #[command(flatten)]
    shared: SharedArgs,
    /// Sample rate in Hz.
    #[arg(long)]
    sample_rate: f64,
    /// Fit on this many log-spaced frequency bins instead of every bin.
    #[arg(long)]
    bins: Option<usize>,
    /// Normalize the whitened floor to 1 instead of sqrt(a).
    #[arg(long)]
    unit_scale: bool,
    /// Draw the noise fit (requires the `visualise` feature).
    #[arg(long)]
    plot: bool,
}

#[derive(Args, Debug)]
struct WienerArgs {
    #[command(flatten)]
    shared: SharedArgs,
    /// Fraction of positive frequencies below the noise-fit tail.
    #[arg(long)]
    cutoff: Option<f64>,
    /// Sample rate in Hz (defaults to 1, i.e. cycles/sample).
    #[arg(long)]
    sample_rate: Option<f64>,
}

#[derive(Serialize)]
struct Output<'a, D: Serialize> {
    input: &'a Path,
    report: &'a QualityReport,
    diagnostics: &'a D,
}

fn run_whiten(path: &Path, args: &WhitenArgs, cfg: &WhitenConfig) -> Result<String> {
    let samples = read_samples(path)?;
    let res = whiten(&samples, args.sample_rate, cfg)
        .with_context(|| format!("whitening {}", path.display()))?;
    let report = assess_whitening(&res, &QualityConfig::default());

    let out_dir = args.shared.out_dir.as_deref();
    write_samples(&gen_output_fn(out_dir, path, "whiten", "csv"), &res.filtered)?;
    write_json(
        &gen_output_fn(out_dir, path, "whiten", "json"),
        &Output {
            input: path,
            report: &report,
            diagnostics: &res.diagnostics,
        },
    )?;

    if args.plot {
        #[cfg(feature = "visualise")]
        {
            let png = gen_output_fn(out_dir, path, "whiten", "png");
            let name = path.display().to_string();
            if let Err(e) = plot::plot_noise_fit(&res.diagnostics, &png, &name) {
                log::warn!("{}: plot failed: {e}", path.display());
            }
        }
        #[cfg(not(feature = "visualise"))]
        log::warn!("--plot ignored: built without the `visualise` feature");
    }

    Ok(format!("{}\n{}", path.display(), format_report(&report)))
}

fn run_wiener(path: &Path, args: &WienerArgs, cfg: &WienerConfig) -> Result<String> {
    let samples = read_samples(path)?;
    let res = wiener_filter(&samples, cfg)
        .with_context(|| format!("Wiener-filtering {}", path.display()))?;
    let report = assess_wiener(&res, &QualityConfig::default());

    let out_dir = args.shared.out_dir.as_deref();
    write_samples(&gen_output_fn(out_dir, path, "wiener", "csv"), &res.filtered)?;
    write_json(
        &gen_output_fn(out_dir, path, "wiener", "json"),
        &Output {
            input: path,
            report: &report,
            diagnostics: &res.diagnostics,
        },
    )?;
    Ok(format!("{}\n{}", path.display(), format_report(&report)))
}

/// Run `job` on every file in parallel, print reports in input order.
fn run_all(files: &[PathBuf], job: impl Fn(&Path) -> Result<String> + Sync) -> Result<()> {
    let results: Vec<Result<String>> = files.par_iter().map(|p| job(p)).collect();
    let mut failed = 0usize;
    for (path, res) in files.iter().zip(results) {
        match res {
            Ok(text) => println!("{text}"),
            Err(e) => {
                failed += 1;
                eprintln!("error: {}: {e:#}", path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} file(s) failed", files.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Whiten(args) => {
            let mut cfg: WhitenConfig = load_config(args.shared.config.as_deref())?;
            if let Some(bins) = args.bins {
                cfg.bin_count = Some(bins);
            }
            if args.unit_scale {
                cfg.scale = WhiteningScale::Unit;
            }
            run_all(&args.shared.files, |p| run_whiten(p, args, &cfg))
        }
        Command::Wiener(args) => {
            let mut cfg: WienerConfig = load_config(args.shared.config.as_deref())?;
            if let Some(cutoff) = args.cutoff {
                cfg.cutoff_fraction = cutoff;
            }
            if let Some(fs) = args.sample_rate {
                cfg.sample_rate = fs;
            }
            run_all(&args.shared.files, |p| run_wiener(p, args, &cfg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_noise(dir: &Path, name: &str, n: usize) -> PathBuf {
        // Deterministic broadband sequence with a slow drift.
        let mut state = 0x2545_F491_4F6C_DD1Du64;
        let text: Vec<String> = (0..n)
            .map(|i| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let u = (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5;
                format!("{}", u + 0.3 * (i as f64 * 0.002).sin())
            })
            .collect();
        let path = dir.join(name);
        std::fs::write(&path, text.join("\n")).unwrap();
        path
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "todfilter",
            "whiten",
            "a.txt",
            "--sample-rate",
            "1000",
            "--bins",
            "50",
        ])
        .unwrap();
        let Command::Whiten(w) = cli.command else {
            panic!("expected whiten");
        };
        assert_eq!(w.sample_rate, 1000.0);
        assert_eq!(w.bins, Some(50));
        assert!(!w.unit_scale);

        let cli =
            Cli::try_parse_from(["todfilter", "wiener", "a.txt", "b.txt", "--cutoff", "0.7"])
                .unwrap();
        let Command::Wiener(w) = cli.command else {
            panic!("expected wiener");
        };
        assert_eq!(w.shared.files.len(), 2);
        assert_eq!(w.cutoff, Some(0.7));
        assert_eq!(w.sample_rate, None);

        assert!(Cli::try_parse_from(["todfilter", "whiten", "a.txt"]).is_err());
        assert!(Cli::try_parse_from(["todfilter", "wiener"]).is_err());
    }

    #[test]
    fn whiten_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_noise(dir.path(), "tod.txt", 2048);
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let args = WhitenArgs {
            shared: SharedArgs {
                files: vec![input.clone()],
                config: None,
                out_dir: Some(out.clone()),
            },
            sample_rate: 100.0,
            bins: Some(30),
            unit_scale: false,
            plot: false,
        };
        let cfg = WhitenConfig {
            bin_count: Some(30),
            ..Default::default()
        };
        let text = run_whiten(&input, &args, &cfg).unwrap();
        assert!(text.contains("== whiten =="));

        let filtered = read_samples(&out.join("tod_whiten.csv")).unwrap();
        assert_eq!(filtered.len(), 2048);
        let text = std::fs::read_to_string(out.join("tod_whiten.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["report"]["strategy"], "whiten");
        assert!(json["diagnostics"]["fit"]["points"].as_u64().unwrap() > 0);
    }

    #[test]
    fn wiener_writes_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_noise(dir.path(), "scan.dat", 1024);
        let args = WienerArgs {
            shared: SharedArgs {
                files: vec![input.clone()],
                config: None,
                out_dir: None,
            },
            cutoff: None,
            sample_rate: None,
        };
        run_wiener(&input, &args, &WienerConfig::default()).unwrap();
        let filtered = read_samples(&dir.path().join("scan_wiener.csv")).unwrap();
        assert_eq!(filtered.len(), 1024);
        assert!(dir.path().join("scan_wiener.json").exists());
    }

    #[test]
    fn failures_are_counted_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let flat = dir.path().join("flat.txt");
        std::fs::write(&flat, "5\n".repeat(256)).unwrap();
        let err = run_all(&[flat.clone(), dir.path().join("missing.txt")], |p| {
            run_wiener(
                p,
                &WienerArgs {
                    shared: SharedArgs {
                        files: vec![],
                        config: None,
                        out_dir: None,
                    },
                    cutoff: None,
                    sample_rate: None,
                },
                &WienerConfig::default(),
            )
        })
        .unwrap_err();
        assert!(err.to_string().contains("2 of 2"));
        assert!(!dir.path().join("flat_wiener.csv").exists());
    }
}
