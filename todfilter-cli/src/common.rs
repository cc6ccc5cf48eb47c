use std::path::{Path, PathBuf};

/// `<dir>/<stem>_<strategy>.<ext>`, where `dir` defaults to the input's own directory.
pub fn gen_output_fn(
    out_dir: Option<&Path>,
    input: impl AsRef<Path>,
    strategy: &str,
    ext: &str,
) -> PathBuf {
    let input = input.as_ref();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "series".to_string());
    let dir = match out_dir {
        Some(d) => d.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{stem}_{strategy}.{ext}"))
}
