use crate::utils::error::{FtwError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const CONDA_SETUP_RELATIVE: &str = "etc/profile.d/conda.sh";

fn common_locations() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join("anaconda3"));
        paths.push(home.join("miniconda3"));
    }
    paths.push(PathBuf::from("/opt/anaconda3"));
    paths.push(PathBuf::from("/opt/miniconda3"));
    paths
}

/// 先詢問 `conda info --base`，再檢查常見安裝位置
pub fn detect_conda_base() -> Option<PathBuf> {
    match Command::new("conda").args(["info", "--base"]).output() {
        Ok(output) if output.status.success() => {
            let base = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !base.is_empty() {
                tracing::debug!("conda reports base at {}", base);
                return Some(PathBuf::from(base));
            }
        }
        Ok(output) => {
            tracing::debug!("'conda info --base' exited with {:?}", output.status.code());
        }
        Err(e) => {
            tracing::debug!("conda is not on PATH: {}", e);
        }
    }

    common_locations().into_iter().find(|p| p.exists())
}

/// Accepts either a `conda.sh` path or an installation root containing one.
pub fn resolve_setup_script(path: &Path) -> Result<PathBuf> {
    let expanded = expand_home(path);

    if expanded.file_name().is_some_and(|n| n == "conda.sh") {
        if expanded.is_file() {
            return Ok(expanded);
        }
        return Err(FtwError::CondaNotFound {
            message: format!("Conda setup script not found at: {}", expanded.display()),
        });
    }

    if !expanded.exists() {
        return Err(FtwError::CondaNotFound {
            message: format!("Conda environment not found at: {}", expanded.display()),
        });
    }

    let script = expanded.join(CONDA_SETUP_RELATIVE);
    if script.is_file() {
        Ok(script)
    } else {
        Err(FtwError::CondaNotFound {
            message: format!("Conda setup script not found at: {}", script.display()),
        })
    }
}

/// Saved path first, then auto-detection.
pub fn locate_setup_script(saved: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = saved {
        match resolve_setup_script(path) {
            Ok(script) => return Ok(script),
            Err(e) => tracing::warn!("⚠️ Saved conda path is unusable: {}", e),
        }
    }

    let base = detect_conda_base().ok_or_else(|| FtwError::CondaNotFound {
        message: "no conda installation detected".to_string(),
    })?;
    resolve_setup_script(&base)
}

pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

pub fn validate_env_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(FtwError::InvalidConfigValueError {
            field: "env_name".to_string(),
            value: name.to_string(),
            reason: "Use letters, digits, '.', '_' or '-'".to_string(),
        })
    }
}
