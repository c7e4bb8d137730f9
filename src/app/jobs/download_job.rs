use crate::app::Toolchain;
use crate::core::catalog::{select_best_images, BestImages, CloudLadder};
use crate::core::script::DownloadScript;
use crate::domain::model::{Region, SeasonWindows};
use crate::domain::ports::{EventSender, ImageryCatalog, Job};
use crate::utils::error::{FtwError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Finds the best scene per window and stacks them into an 8-band raster.
pub struct DownloadJob {
    pub catalog: Arc<dyn ImageryCatalog>,
    pub region: Region,
    pub windows: SeasonWindows,
    pub ladder: CloudLadder,
    pub output_path: PathBuf,
    /// `None` stops after the catalog search.
    pub toolchain: Option<Toolchain>,
}

impl DownloadJob {
    pub async fn search(&self, events: &EventSender) -> Result<BestImages> {
        super::report(events, 5, "Searching imagery catalog...");
        let best =
            select_best_images(self.catalog.as_ref(), &self.region, &self.windows, &self.ladder)
                .await?;
        super::info(events, format!("Window A scene: {}", best.win_a.id));
        super::info(events, format!("Window B scene: {}", best.win_b.id));
        super::report(events, 40, "Found scenes for both windows");
        Ok(best)
    }
}

#[async_trait]
impl Job for DownloadJob {
    fn name(&self) -> &str {
        "image download"
    }

    async fn execute(&self, events: &EventSender) -> Result<String> {
        let best = self.search(events).await?;

        let Some(toolchain) = &self.toolchain else {
            return Ok(format!(
                "win_a={} win_b={} bbox={:?}",
                best.win_a.id, best.win_b.id, best.bbox
            ));
        };

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let script = DownloadScript {
            conda_setup: &toolchain.conda_setup,
            env_name: &toolchain.env_name,
            win_a_id: &best.win_a.id,
            win_b_id: &best.win_b.id,
            bbox: best.bbox,
            output_path: &self.output_path,
        }
        .render();

        let transcript = toolchain
            .runner
            .run("Image download", &script, Some(events.clone()))
            .await?;

        // 腳本最後一行輸出實際存檔路徑
        let saved = transcript
            .last_plain_line()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.output_path.clone());
        if !saved.is_file() {
            return Err(FtwError::MissingOutput {
                path: saved.display().to_string(),
            });
        }
        Ok(format!("Image saved to {}", saved.display()))
    }
}
