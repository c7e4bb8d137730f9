use crate::domain::model::{CropSeason, GeoPoint, Region};
use crate::domain::ports::SeasonTimingSource;
use crate::utils::error::{FtwError, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeasonRow {
    pub season: CropSeason,
    pub lon: f64,
    pub lat: f64,
    pub sos_doy: u16,
    pub eos_doy: u16,
}

/// Sampled crop-calendar cells (`season,lon,lat,sos_doy,eos_doy`), looked up by nearest cell.
#[derive(Debug, Clone, Default)]
pub struct SeasonTable {
    rows: Vec<SeasonRow>,
    max_distance_deg: Option<f64>,
}

impl SeasonTable {
    pub fn from_rows(rows: Vec<SeasonRow>) -> Self {
        Self {
            rows,
            max_distance_deg: None,
        }
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        Self::from_reader(reader)
    }

    pub fn from_csv_str(content: &str) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut rows = Vec::new();
        for record in reader.deserialize::<SeasonRow>() {
            let row = record?;
            for (name, doy) in [("sos_doy", row.sos_doy), ("eos_doy", row.eos_doy)] {
                if !(1..=366).contains(&doy) {
                    return Err(FtwError::InvalidConfigValueError {
                        field: name.to_string(),
                        value: doy.to_string(),
                        reason: "Day of year must be between 1 and 366".to_string(),
                    });
                }
            }
            rows.push(row);
        }
        tracing::debug!("Loaded {} season calendar cells", rows.len());
        Ok(Self::from_rows(rows))
    }

    pub fn with_max_distance(mut self, degrees: f64) -> Self {
        self.max_distance_deg = Some(degrees);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SeasonTimingSource for SeasonTable {
    fn lookup(&self, season: CropSeason, at: GeoPoint) -> Option<(u16, u16)> {
        let distance2 = |row: &SeasonRow| {
            let dx = row.lon - at.lon;
            let dy = row.lat - at.lat;
            dx * dx + dy * dy
        };

        let nearest = self
            .rows
            .iter()
            .filter(|row| row.season == season)
            .min_by(|a, b| distance2(a).total_cmp(&distance2(b)))?;

        if let Some(limit) = self.max_distance_deg {
            if distance2(nearest).sqrt() > limit {
                return None;
            }
        }
        Some((nearest.sos_doy, nearest.eos_doy))
    }
}

/// Day-of-year to date, clamping 366 to Dec 31 in non-leap years.
pub fn date_from_doy(year: i32, doy: u16) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let date = jan1 + Duration::days(doy.max(1) as i64 - 1);
    if date.year() == year {
        Some(date)
    } else {
        NaiveDate::from_ymd_opt(year, 12, 31)
    }
}

/// Keeps SOS/EOS in sync with the season, year and ROI selection.
pub struct SeasonDateUpdater<S: SeasonTimingSource> {
    source: S,
    season: CropSeason,
    year: i32,
    roi: Option<Region>,
}

impl<S: SeasonTimingSource> SeasonDateUpdater<S> {
    pub fn new(source: S, season: CropSeason, year: i32) -> Self {
        Self {
            source,
            season,
            year,
            roi: None,
        }
    }

    pub fn set_roi(&mut self, roi: Option<Region>) -> Option<(NaiveDate, NaiveDate)> {
        self.roi = roi;
        self.update()
    }

    pub fn set_season(&mut self, season: CropSeason) -> Option<(NaiveDate, NaiveDate)> {
        self.season = season;
        self.update()
    }

    pub fn set_year(&mut self, year: i32) -> Option<(NaiveDate, NaiveDate)> {
        self.year = year;
        self.update()
    }

    /// `None` until an ROI exists or when the calendar has no entry for it.
    pub fn update(&self) -> Option<(NaiveDate, NaiveDate)> {
        let roi = self.roi.as_ref()?;
        let center = roi.center();
        let Some((sos_doy, eos_doy)) = self.source.lookup(self.season, center) else {
            tracing::debug!(
                "No {} calendar entry near ({:.4}, {:.4})",
                self.season,
                center.lon,
                center.lat
            );
            return None;
        };

        // 冬季作物在前一年秋季播種
        let sos_year = if sos_doy > eos_doy {
            self.year - 1
        } else {
            self.year
        };
        let sos = date_from_doy(sos_year, sos_doy)?;
        let eos = date_from_doy(self.year, eos_doy)?;
        Some((sos, eos))
    }
}
