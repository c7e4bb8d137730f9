pub mod bbox;
pub mod catalog;
pub mod conda;
pub mod engine;
pub mod models;
pub mod progress;
pub mod raster;
pub mod reproject;
pub mod runner;
pub mod script;
pub mod season;
pub mod windows;

pub use crate::domain::model::{JobEvent, ProgressEvent, Region, SeasonWindows};
pub use crate::domain::ports::{EventSender, ImageryCatalog, Job};
pub use crate::utils::error::Result;
