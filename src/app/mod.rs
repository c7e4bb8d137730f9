pub mod jobs;

use crate::core::runner::ScriptRunner;
use std::path::{Path, PathBuf};

/// Where and how the `ftw` CLI is reached.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub conda_setup: PathBuf,
    pub env_name: String,
    pub runner: ScriptRunner,
}

/// Defaults to `<tmp>/<fallback>` and forces a `.tif` extension.
pub fn normalize_output_path(path: Option<&Path>, fallback: &str) -> PathBuf {
    let path = match path {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::temp_dir().join(fallback),
    };
    let is_tif = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif"));
    if is_tif {
        path
    } else {
        let mut name = path.clone().into_os_string();
        name.push(".tif");
        PathBuf::from(name)
    }
}
