use crate::app::Toolchain;
use crate::core::models::ModelRegistry;
use crate::core::raster::{ensure_band_count, EXPECTED_BANDS};
use crate::core::script::InferenceScript;
use crate::domain::ports::{EventSender, Job};
use crate::utils::error::{FtwError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub enum ModelSource {
    /// A release model, downloaded into the registry cache on first use.
    Known(String),
    Checkpoint(PathBuf),
}

/// Runs `ftw inference run` and, optionally, `ftw inference polygonize`.
pub struct InferenceJob {
    pub toolchain: Toolchain,
    pub registry: Arc<ModelRegistry>,
    pub raster_path: PathBuf,
    pub model: ModelSource,
    pub output_path: PathBuf,
    pub polygonize: Option<f64>,
}

impl InferenceJob {
    async fn resolve_model(&self, events: &EventSender) -> Result<PathBuf> {
        match &self.model {
            ModelSource::Known(name) => {
                super::report(events, 0, "Checking model checkpoint...");
                self.registry.ensure_model(name, Some(events)).await
            }
            ModelSource::Checkpoint(path) => self.registry.import_checkpoint(path),
        }
    }
}

#[async_trait]
impl Job for InferenceJob {
    fn name(&self) -> &str {
        "inference"
    }

    async fn execute(&self, events: &EventSender) -> Result<String> {
        ensure_band_count(&self.raster_path, EXPECTED_BANDS)?;
        let model_path = self.resolve_model(events).await?;

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let script = InferenceScript {
            conda_setup: &self.toolchain.conda_setup,
            env_name: &self.toolchain.env_name,
            raster_path: &self.raster_path,
            model_path: &model_path,
            output_path: &self.output_path,
            polygonize: self.polygonize,
        }
        .render();

        self.toolchain
            .runner
            .run("Process", &script, Some(events.clone()))
            .await?;

        if !self.output_path.is_file() {
            return Err(FtwError::MissingOutput {
                path: self.output_path.display().to_string(),
            });
        }
        Ok(format!(
            "Processing completed successfully! Output: {}",
            self.output_path.display()
        ))
    }
}
