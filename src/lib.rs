pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{RunConfig, Settings, SettingsStore};

pub use core::engine::{JobEngine, JobHandle};
pub use core::windows::calculate_window_dates;
pub use utils::error::{FtwError, Result};
