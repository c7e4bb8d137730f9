use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Coordinate reference systems understood by the bbox parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    Wgs84,
    WebMercator,
    Utm { zone: u32, north: bool },
}

impl Crs {
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Utm { zone, north: true } => 32600 + zone,
            Crs::Utm { zone, north: false } => 32700 + zone,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// 解析 "EPSG:xxxx" 形式的代碼
    pub fn from_authority(code: &str) -> Option<Self> {
        let (authority, number) = code.trim().split_once(':')?;
        if !authority.trim().eq_ignore_ascii_case("EPSG") {
            return None;
        }
        let epsg: u32 = number.trim().parse().ok()?;
        match epsg {
            4326 => Some(Crs::Wgs84),
            3857 | 900913 => Some(Crs::WebMercator),
            32601..=32660 => Some(Crs::Utm {
                zone: epsg - 32600,
                north: true,
            }),
            32701..=32760 => Some(Crs::Utm {
                zone: epsg - 32700,
                north: false,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Region of interest in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
}

impl Region {
    pub fn new(top_left: GeoPoint, bottom_right: GeoPoint) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    /// Swaps coordinates so that `top_left` is north-west of `bottom_right`.
    pub fn normalized(&self) -> Self {
        let west = self.top_left.lon.min(self.bottom_right.lon);
        let east = self.top_left.lon.max(self.bottom_right.lon);
        let north = self.top_left.lat.max(self.bottom_right.lat);
        let south = self.top_left.lat.min(self.bottom_right.lat);
        Self {
            top_left: GeoPoint::new(west, north),
            bottom_right: GeoPoint::new(east, south),
        }
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.top_left.lon + self.bottom_right.lon) / 2.0,
            (self.top_left.lat + self.bottom_right.lat) / 2.0,
        )
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub fn bbox(&self) -> [f64; 4] {
        [
            self.top_left.lon,
            self.bottom_right.lat,
            self.bottom_right.lon,
            self.top_left.lat,
        ]
    }

    /// Closed GeoJSON ring, counter-clockwise from the south-west corner.
    pub fn polygon_ring(&self) -> Vec<[f64; 2]> {
        let [min_lon, min_lat, max_lon, max_lat] = self.bbox();
        vec![
            [min_lon, min_lat],
            [min_lon, max_lat],
            [max_lon, max_lat],
            [max_lon, min_lat],
            [min_lon, min_lat],
        ]
    }
}

/// Output of the bbox parser: every point already in WGS84.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedBbox {
    pub center: GeoPoint,
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
}

impl ParsedBbox {
    pub fn region(&self) -> Region {
        Region::new(self.top_left, self.bottom_right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeasonWindows {
    pub win_a_start: NaiveDate,
    pub win_a_end: NaiveDate,
    pub win_b_start: NaiveDate,
    pub win_b_end: NaiveDate,
}

impl SeasonWindows {
    pub fn to_iso(&self) -> (String, String, String, String) {
        let fmt = |d: NaiveDate| d.format("%Y-%m-%d").to_string();
        (
            fmt(self.win_a_start),
            fmt(self.win_a_end),
            fmt(self.win_b_start),
            fmt(self.win_b_end),
        )
    }

    pub fn window(&self, id: WindowId) -> (NaiveDate, NaiveDate) {
        match id {
            WindowId::A => (self.win_a_start, self.win_a_end),
            WindowId::B => (self.win_b_start, self.win_b_end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowId {
    A,
    B,
}

impl WindowId {
    pub fn letter(&self) -> char {
        match self {
            WindowId::A => 'A',
            WindowId::B => 'B',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
}

/// One classified line of subprocess stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolLine {
    Progress(ProgressEvent),
    Info(String),
    Error(String),
    Other(String),
}

/// Messages a background job sends back to the main task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Progress(ProgressEvent),
    Info(String),
    Error(String),
    Finished(std::result::Result<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropSeason {
    Winter,
    Summer,
    Other,
}

impl FromStr for CropSeason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "winter" => Ok(CropSeason::Winter),
            "summer" => Ok(CropSeason::Summer),
            "other" => Ok(CropSeason::Other),
            other => Err(format!("unknown crop season '{}'", other)),
        }
    }
}

impl fmt::Display for CropSeason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CropSeason::Winter => "winter",
            CropSeason::Summer => "summer",
            CropSeason::Other => "other",
        };
        f.write_str(name)
    }
}

/// RGB band combinations of the stacked 8-band raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    WindowA,
    WindowB,
    NirA,
    NirB,
}

impl Composite {
    pub const ALL: [Composite; 4] = [
        Composite::WindowA,
        Composite::WindowB,
        Composite::NirA,
        Composite::NirB,
    ];

    pub fn bands(&self) -> [u8; 3] {
        match self {
            Composite::WindowA => [1, 2, 3],
            Composite::WindowB => [5, 6, 7],
            Composite::NirA => [4, 1, 2],
            Composite::NirB => [8, 5, 6],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Composite::WindowA => "win_A",
            Composite::WindowB => "win_B",
            Composite::NirA => "NIR_A",
            Composite::NirB => "NIR_B",
        }
    }
}
