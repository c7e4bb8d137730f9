use crate::app::Toolchain;
use crate::core::script::SetupScript;
use crate::domain::ports::{EventSender, Job};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Creates the conda environment and installs `ftw-tools` when missing.
pub struct SetupJob {
    pub toolchain: Toolchain,
    pub python_version: String,
    pub conda_packages: Vec<String>,
    pub pip_packages: Vec<String>,
}

impl SetupJob {
    pub fn script(&self) -> String {
        SetupScript {
            conda_setup: &self.toolchain.conda_setup,
            env_name: &self.toolchain.env_name,
            python_version: &self.python_version,
            conda_packages: &self.conda_packages,
            pip_packages: &self.pip_packages,
        }
        .render()
    }
}

#[async_trait]
impl Job for SetupJob {
    fn name(&self) -> &str {
        "environment setup"
    }

    async fn execute(&self, events: &EventSender) -> Result<String> {
        super::report(events, 0, "Setting up a conda environment...");
        self.toolchain
            .runner
            .run("Environment setup", &self.script(), Some(events.clone()))
            .await?;
        Ok(format!("Environment '{}' is ready", self.toolchain.env_name))
    }
}
