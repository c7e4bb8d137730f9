use crate::domain::model::{CropSeason, GeoPoint, JobEvent, Region};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::mpsc::UnboundedSender;

pub type EventSender = UnboundedSender<JobEvent>;

/// Converts projected coordinates into WGS84 longitude/latitude.
pub trait CoordinateTransform: Send + Sync {
    fn to_wgs84(&self, x: f64, y: f64) -> GeoPoint;
}

/// A scene returned by a catalog search.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub datetime: Option<String>,
    pub cloud_cover: Option<f64>,
}

#[async_trait]
pub trait ImageryCatalog: Send + Sync {
    /// Scenes intersecting `region` inside `[start, end]` with cloud cover below `cloud_lt`.
    async fn search(
        &self,
        region: &Region,
        start: NaiveDate,
        end: NaiveDate,
        cloud_lt: u8,
    ) -> Result<Vec<Scene>>;
}

/// Per-location season timing, as day-of-year values.
pub trait SeasonTimingSource: Send + Sync {
    fn lookup(&self, season: CropSeason, at: GeoPoint) -> Option<(u16, u16)>;
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Runs to completion, reporting progress on `events`; returns a summary message.
    async fn execute(&self, events: &EventSender) -> Result<String>;
}
