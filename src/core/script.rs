use std::fmt::Write as _;
use std::path::Path;

/// Single-quotes a value for bash, escaping embedded quotes.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

#[derive(Debug, Clone)]
pub struct SetupScript<'a> {
    pub conda_setup: &'a Path,
    pub env_name: &'a str,
    pub python_version: &'a str,
    pub conda_packages: &'a [String],
    pub pip_packages: &'a [String],
}

impl SetupScript<'_> {
    pub fn render(&self) -> String {
        let env = shell_quote(self.env_name);
        let conda_packages = self
            .conda_packages
            .iter()
            .map(|p| shell_quote(p))
            .collect::<Vec<_>>()
            .join(" ");
        let pip_packages = self
            .pip_packages
            .iter()
            .map(|p| shell_quote(p))
            .collect::<Vec<_>>()
            .join(" ");

        let mut script = String::new();
        let _ = writeln!(script, "set -o pipefail");
        let _ = writeln!(script, "source {}", quote_path(self.conda_setup));
        let _ = writeln!(
            script,
            r#"if ! conda env list | awk '{{print $1}}' | grep -qx -- {env}; then
    echo "[PROGRESS] 25 Creating conda environment {name}..."
    conda create -y -n {env} python={py} || {{ echo "[ERROR] Failed to create environment {name}"; exit 1; }}
else
    echo "[PROGRESS] 25 Conda environment {name} already exists."
fi"#,
            env = env,
            name = self.env_name.replace('"', ""),
            py = shell_quote(self.python_version),
        );
        let _ = writeln!(
            script,
            r#"echo "[PROGRESS] 50 Checking if 'ftw' CLI is available..."
conda activate {env} || {{ echo "[ERROR] Failed to activate environment"; exit 1; }}
if ftw inference --help > /dev/null 2>&1; then
    echo "[PROGRESS] 75 'ftw' CLI already available. Skipping installation."
else
    echo "[PROGRESS] 75 Installing required packages..."
    conda install -y -c conda-forge {conda_packages} || {{ echo "[ERROR] conda install failed"; exit 1; }}
    pip install {pip_packages} || {{ echo "[ERROR] pip install failed"; exit 1; }}
fi"#,
            env = env,
            conda_packages = conda_packages,
            pip_packages = pip_packages,
        );
        let _ = writeln!(
            script,
            r#"echo "[PROGRESS] 90 Final test of 'ftw inference --help'"
ftw inference --help > /dev/null || {{ echo "[ERROR] 'ftw' CLI is not usable"; exit 1; }}
echo "[PROGRESS] 100 Setup complete""#
        );
        script
    }
}

#[derive(Debug, Clone)]
pub struct InferenceScript<'a> {
    pub conda_setup: &'a Path,
    pub env_name: &'a str,
    pub raster_path: &'a Path,
    pub model_path: &'a Path,
    pub output_path: &'a Path,
    /// Simplification tolerance; `None` skips polygonization.
    pub polygonize: Option<f64>,
}

impl InferenceScript<'_> {
    pub fn render(&self) -> String {
        let raster = quote_path(self.raster_path);
        let model = quote_path(self.model_path);
        let output = quote_path(self.output_path);

        let mut script = String::new();
        let _ = writeln!(script, "source {}", quote_path(self.conda_setup));
        let _ = writeln!(
            script,
            r#"conda activate {} || {{ echo "[ERROR] Failed to activate environment"; exit 1; }}"#,
            shell_quote(self.env_name)
        );
        let _ = writeln!(
            script,
            r#"echo "[PROGRESS] 45 Running inference..."
echo "[INFO] Using model: "{model}
echo "[INFO] Processing raster: "{raster}
if ! ftw inference run {raster} --model {model} --out {output} --overwrite; then
    echo "[ERROR] Inference failed"
    exit 1
fi
echo "[PROGRESS] 85 Inference complete""#
        );
        if let Some(simplify) = self.polygonize {
            let _ = writeln!(
                script,
                r#"echo "[PROGRESS] 90 Running polygonization..."
if ! ftw inference polygonize {output} --simplify {simplify}; then
    echo "[ERROR] Polygonization failed"
    exit 1
fi
echo "[PROGRESS] 95 Polygonization complete""#
            );
        }
        let _ = writeln!(script, r#"echo "[PROGRESS] 100 Process complete""#);
        script
    }
}

#[derive(Debug, Clone)]
pub struct DownloadScript<'a> {
    pub conda_setup: &'a Path,
    pub env_name: &'a str,
    pub win_a_id: &'a str,
    pub win_b_id: &'a str,
    pub bbox: [f64; 4],
    pub output_path: &'a Path,
}

impl DownloadScript<'_> {
    pub fn render(&self) -> String {
        let bbox = self
            .bbox
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let output = quote_path(self.output_path);

        let mut script = String::new();
        let _ = writeln!(script, "source {}", quote_path(self.conda_setup));
        let _ = writeln!(
            script,
            r#"conda activate {} || {{ echo "[ERROR] Failed to activate environment"; exit 1; }}"#,
            shell_quote(self.env_name)
        );
        let _ = writeln!(
            script,
            r#"echo "[PROGRESS] 60 Downloading and stacking scenes..."
echo "[INFO] Window A scene: "{win_a}
echo "[INFO] Window B scene: "{win_b}
if ! ftw inference download --win_a {win_a} --win_b {win_b} --out {output} --bbox {bbox} --overwrite; then
    echo "[ERROR] Image download failed"
    exit 1
fi
echo "[PROGRESS] 100 Download complete"
echo {output}"#,
            win_a = shell_quote(self.win_a_id),
            win_b = shell_quote(self.win_b_id),
            output = output,
            bbox = shell_quote(&bbox),
        );
        script
    }
}
