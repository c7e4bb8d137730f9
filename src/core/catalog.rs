//! STAC item search and best-scene selection for the two season windows.

use crate::domain::model::{Region, SeasonWindows, WindowId};
use crate::domain::ports::{ImageryCatalog, Scene};
use crate::utils::error::{FtwError, Result};
use crate::utils::validation::validate_range;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const PLANETARY_COMPUTER_URL: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
pub const SENTINEL2_COLLECTION: &str = "sentinel-2-l2a";
pub const DEFAULT_FALLBACK_THRESHOLDS: [u8; 3] = [50, 70, 100];

// ---------------------------------------------------------------------------
// Cloud-cover ladder
// ---------------------------------------------------------------------------

/// Strictly increasing cloud-cover thresholds tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudLadder {
    thresholds: Vec<u8>,
}

impl CloudLadder {
    /// `first` is always tried first; fallbacks not above it are dropped.
    pub fn new(first: u8, fallbacks: &[u8]) -> Result<Self> {
        validate_range("max_cloud_cover", first, 0, 100)?;
        let mut thresholds = vec![first];
        for &t in fallbacks {
            validate_range("cloud_thresholds", t, 0, 100)?;
            if t > *thresholds.last().unwrap_or(&first) {
                thresholds.push(t);
            }
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[u8] {
        &self.thresholds
    }

    pub fn max(&self) -> u8 {
        self.thresholds.last().copied().unwrap_or(100)
    }
}

impl Default for CloudLadder {
    fn default() -> Self {
        Self {
            thresholds: vec![20, 50, 70, 100],
        }
    }
}

// ---------------------------------------------------------------------------
// Search request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBody {
    pub collections: Vec<String>,
    pub intersects: serde_json::Value,
    pub datetime: String,
    pub query: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemCollection {
    #[serde(default)]
    pub features: Vec<Item>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub properties: ItemProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemProperties {
    pub datetime: Option<String>,
    #[serde(rename = "eo:cloud_cover")]
    pub cloud_cover: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    pub method: Option<String>,
    pub body: Option<serde_json::Value>,
    pub merge: Option<bool>,
}

// ---------------------------------------------------------------------------
// HTTP catalog
// ---------------------------------------------------------------------------

pub struct StacCatalog {
    client: Client,
    url: String,
    collection: String,
    page_limit: u32,
    max_pages: usize,
}

impl StacCatalog {
    pub fn new(url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            page_limit: 100,
            max_pages: 10,
        })
    }

    pub fn with_paging(mut self, page_limit: u32, max_pages: usize) -> Self {
        self.page_limit = page_limit;
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.url)
    }

    fn build_body(
        &self,
        region: &Region,
        start: NaiveDate,
        end: NaiveDate,
        cloud_lt: u8,
    ) -> SearchBody {
        SearchBody {
            collections: vec![self.collection.clone()],
            intersects: serde_json::json!({
                "type": "Polygon",
                "coordinates": [region.polygon_ring()],
            }),
            datetime: format!("{}/{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
            query: serde_json::json!({ "eo:cloud_cover": { "lt": cloud_lt } }),
            limit: Some(self.page_limit),
        }
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<ItemCollection> {
        let response = self.client.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn get(&self, url: &str) -> Result<ItemCollection> {
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<ItemCollection> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FtwError::CatalogError {
                message: format!(
                    "STAC search returned HTTP {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                ),
            });
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| FtwError::CatalogError {
            message: format!("parsing STAC response: {}", e),
        })
    }

    /// Request body for a `next` link: link body, optionally merged over the previous one.
    fn next_body(link: &Link, previous: &serde_json::Value) -> serde_json::Value {
        match (&link.body, link.merge.unwrap_or(false)) {
            (Some(link_body), true) => {
                let mut merged = previous.clone();
                if let (Some(base), Some(overlay)) = (merged.as_object_mut(), link_body.as_object())
                {
                    for (k, v) in overlay {
                        base.insert(k.clone(), v.clone());
                    }
                }
                merged
            }
            (Some(link_body), false) => link_body.clone(),
            (None, _) => previous.clone(),
        }
    }
}

#[async_trait]
impl ImageryCatalog for StacCatalog {
    async fn search(
        &self,
        region: &Region,
        start: NaiveDate,
        end: NaiveDate,
        cloud_lt: u8,
    ) -> Result<Vec<Scene>> {
        let mut body = serde_json::to_value(self.build_body(region, start, end, cloud_lt))?;
        let mut page = self.post(&self.search_url(), &body).await?;
        let mut scenes = Vec::new();

        for page_no in 1..=self.max_pages {
            scenes.extend(page.features.drain(..).map(|item| Scene {
                id: item.id,
                datetime: item.properties.datetime,
                cloud_cover: item.properties.cloud_cover,
            }));

            let Some(next) = page.links.iter().find(|l| l.rel == "next").cloned() else {
                break;
            };
            if page_no == self.max_pages {
                tracing::warn!(
                    "⚠️ Stopping STAC pagination after {} pages ({} scenes)",
                    self.max_pages,
                    scenes.len()
                );
                break;
            }

            let method = next.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
            page = if method == "POST" {
                body = Self::next_body(&next, &body);
                self.post(&next.href, &body).await?
            } else {
                self.get(&next.href).await?
            };
        }

        Ok(scenes)
    }
}

// ---------------------------------------------------------------------------
// Best-scene selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BestImages {
    pub win_a: Scene,
    pub win_b: Scene,
    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub bbox: [f64; 4],
}

/// Lowest `eo:cloud_cover` wins; a missing value counts as 100.
pub fn least_cloudy(scenes: &[Scene]) -> Option<&Scene> {
    scenes.iter().min_by(|a, b| {
        let ca = a.cloud_cover.unwrap_or(100.0);
        let cb = b.cloud_cover.unwrap_or(100.0);
        ca.total_cmp(&cb)
    })
}

async fn find_best_image(
    catalog: &dyn ImageryCatalog,
    region: &Region,
    window: WindowId,
    (start, end): (NaiveDate, NaiveDate),
    threshold: u8,
) -> Result<Option<Scene>> {
    tracing::info!(
        "🔍 Window {}: searching {} to {} with cloud cover < {}%",
        window.letter(),
        start,
        end,
        threshold
    );
    let scenes = catalog.search(region, start, end, threshold).await?;
    match least_cloudy(&scenes) {
        Some(best) => {
            tracing::info!(
                "Found image {} from {} with {}% cloud coverage",
                best.id,
                best.datetime.as_deref().unwrap_or("unknown date"),
                best.cloud_cover.unwrap_or(100.0)
            );
            Ok(Some(best.clone()))
        }
        None => {
            tracing::info!("No images found with cloud cover < {}%", threshold);
            Ok(None)
        }
    }
}

/// Walks the ladder, re-searching only the windows still unresolved.
pub async fn select_best_images(
    catalog: &dyn ImageryCatalog,
    region: &Region,
    windows: &SeasonWindows,
    ladder: &CloudLadder,
) -> Result<BestImages> {
    let region = region.normalized();
    let mut win_a = None;
    let mut win_b = None;

    for &threshold in ladder.thresholds() {
        if win_a.is_none() {
            let window = windows.window(WindowId::A);
            win_a = find_best_image(catalog, &region, WindowId::A, window, threshold).await?;
        }
        if win_b.is_none() {
            let window = windows.window(WindowId::B);
            win_b = find_best_image(catalog, &region, WindowId::B, window, threshold).await?;
        }
        if win_a.is_some() && win_b.is_some() {
            break;
        }
    }

    let missing = |window: WindowId| {
        let (start, end) = windows.window(window);
        FtwError::NoImageFound {
            window: window.letter(),
            start: start.format("%Y-%m-%d").to_string(),
            end: end.format("%Y-%m-%d").to_string(),
            max_cloud: ladder.max(),
        }
    };

    Ok(BestImages {
        win_a: win_a.ok_or_else(|| missing(WindowId::A))?,
        win_b: win_b.ok_or_else(|| missing(WindowId::B))?,
        bbox: region.bbox(),
    })
}
