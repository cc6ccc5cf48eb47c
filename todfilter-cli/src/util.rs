use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Parse numbers separated by whitespace, commas or newlines. `#` starts a comment.
pub(super) fn parse_samples(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        for tok in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let v: f64 = tok
                .parse()
                .with_context(|| format!("line {}: `{tok}` is not a number", lineno + 1))?;
            out.push(v);
        }
    }
    if out.is_empty() {
        bail!("no samples found");
    }
    Ok(out)
}

pub(super) fn read_samples(path: &Path) -> Result<Vec<f64>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_samples(&text).with_context(|| format!("parsing {}", path.display()))
}

/// One sample per line.
pub(super) fn write_samples(path: &Path, samples: &[f64]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for x in samples {
        writeln!(w, "{x}")?;
    }
    w.flush()?;
    Ok(())
}

pub(super) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(f), value)
        .with_context(|| format!("writing {}", path.display()))
}

/// Load a (possibly partial) JSON config, or defaults when no path is given.
pub(super) fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}
