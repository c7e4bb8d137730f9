use crate::domain::model::{JobEvent, ProgressEvent};
use crate::domain::ports::EventSender;
use crate::utils::error::{FtwError, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const RELEASE_BASE_URL: &str =
    "https://github.com/fieldsoftheworld/ftw-baselines/releases/download/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub filename: String,
    pub url: String,
    pub classes: u8,
}

impl ModelSpec {
    pub fn release_models() -> Vec<ModelSpec> {
        [
            ("FTW 3 Classes", "3_Class_FULL_FTW_Pretrained.ckpt", 3u8),
            ("FTW 2 Classes", "2_Class_FULL_FTW_Pretrained.ckpt", 2u8),
        ]
        .into_iter()
        .map(|(name, filename, classes)| ModelSpec {
            name: name.to_string(),
            filename: filename.to_string(),
            url: format!("{}/{}", RELEASE_BASE_URL, filename),
            classes,
        })
        .collect()
    }
}

/// Known checkpoints plus the local cache directory they are stored in.
pub struct ModelRegistry {
    models_dir: PathBuf,
    specs: Vec<ModelSpec>,
    client: Client,
}

impl ModelRegistry {
    pub fn new(models_dir: impl Into<PathBuf>, specs: Vec<ModelSpec>) -> Self {
        Self {
            models_dir: models_dir.into(),
            specs,
            client: Client::new(),
        }
    }

    pub fn with_release_models(models_dir: impl Into<PathBuf>) -> Self {
        Self::new(models_dir, ModelSpec::release_models())
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    pub fn find(&self, name: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn find_by_filename(&self, filename: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|s| s.filename == filename)
    }

    pub fn cached_path(&self, spec: &ModelSpec) -> PathBuf {
        self.models_dir.join(&spec.filename)
    }

    /// In-progress download target; only renamed to [`Self::cached_path`] once complete.
    pub fn partial_path(&self, spec: &ModelSpec) -> PathBuf {
        self.models_dir.join(format!("{}.part", spec.filename))
    }

    /// Returns the cached checkpoint, downloading it first if needed.
    pub async fn ensure_model(&self, name: &str, events: Option<&EventSender>) -> Result<PathBuf> {
        let spec = self.find(name).ok_or_else(|| FtwError::UnknownModel {
            name: name.to_string(),
        })?;
        let path = self.cached_path(spec);
        if path.is_file() {
            tracing::debug!("Using cached model {}", path.display());
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.models_dir).await?;
        tracing::info!("⬇️ Downloading model '{}' from {}", spec.name, spec.url);

        let partial = self.partial_path(spec);
        let result = match self.download(spec, &partial, events).await {
            Ok(()) => tokio::fs::rename(&partial, &path).await.map_err(FtwError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(path),
            Err(e) => {
                // 失敗時移除不完整的檔案
                if partial.exists() {
                    let _ = tokio::fs::remove_file(&partial).await;
                }
                Err(FtwError::ModelDownload {
                    model: spec.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn download(
        &self,
        spec: &ModelSpec,
        path: &Path,
        events: Option<&EventSender>,
    ) -> Result<()> {
        let mut response = self
            .client
            .get(&spec.url)
            .send()
            .await?
            .error_for_status()?;
        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(path).await?;
        let mut downloaded: u64 = 0;
        let mut last_percent = None;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if total > 0 {
                let percent = (downloaded.saturating_mul(100) / total).min(100) as u8;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    if let Some(tx) = events {
                        let _ = tx.send(JobEvent::Progress(ProgressEvent {
                            percent,
                            message: "Downloading model...".to_string(),
                        }));
                    }
                }
            }
        }
        file.flush().await?;
        Ok(())
    }

    /// Copies a user checkpoint into the cache; warns when it is not a release file.
    pub fn import_checkpoint(&self, source: &Path) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(FtwError::MissingInput {
                field: format!("checkpoint {}", source.display()),
            });
        }
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| FtwError::MissingInput {
                field: "checkpoint filename".to_string(),
            })?;

        match self.find_by_filename(&filename) {
            Some(spec) => tracing::info!("Checkpoint matches '{}'", spec.name),
            None => {
                let valid = self
                    .specs
                    .iter()
                    .map(|s| s.filename.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                tracing::warn!(
                    "⚠️ {} is not a standard FTW model checkpoint. Expected one of: {}",
                    filename,
                    valid
                );
            }
        }

        std::fs::create_dir_all(&self.models_dir)?;
        let target = self.models_dir.join(&filename);
        let same_file = match (source.canonicalize(), target.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same_file {
            std::fs::copy(source, &target)?;
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_release_models() {
        let specs = ModelSpec::release_models();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].classes, 3);
        assert!(specs[1].url.ends_with("/2_Class_FULL_FTW_Pretrained.ckpt"));
    }

    #[tokio::test]
    async fn test_cached_model_skips_download() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::with_release_models(dir.path());
        let spec = registry.find("FTW 2 Classes").unwrap().clone();
        std::fs::write(registry.cached_path(&spec), b"weights").unwrap();

        let path = registry.ensure_model("FTW 2 Classes", None).await.unwrap();
        assert_eq!(path, dir.path().join("2_Class_FULL_FTW_Pretrained.ckpt"));
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::with_release_models(dir.path());
        assert!(matches!(
            registry.ensure_model("FTW 9 Classes", None).await,
            Err(FtwError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_import_checkpoint_copies_into_cache() {
        let source_dir = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let source = source_dir.path().join("custom.ckpt");
        std::fs::write(&source, b"custom").unwrap();

        let registry = ModelRegistry::with_release_models(cache_dir.path());
        let imported = registry.import_checkpoint(&source).unwrap();
        assert_eq!(imported, cache_dir.path().join("custom.ckpt"));
        assert_eq!(std::fs::read(&imported).unwrap(), b"custom");

        // 已在快取中的檔案不會再複製
        let again = registry.import_checkpoint(&imported).unwrap();
        assert_eq!(again, imported);
    }
}
