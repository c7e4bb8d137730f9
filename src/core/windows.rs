use crate::domain::model::SeasonWindows;
use crate::utils::error::{FtwError, Result};
use chrono::{Duration, NaiveDate};

pub const WINDOW_A_HALF_WIDTH_DAYS: i64 = 15;
pub const WINDOW_B_LEAD_DAYS: i64 = 30;

/// Window A is `[sos-15d, sos+15d]`, window B is `[eos-30d, eos]`.
///
/// Start is not required to precede end; inverted input yields inverted windows.
pub fn calculate_window_dates(sos: NaiveDate, eos: NaiveDate) -> SeasonWindows {
    SeasonWindows {
        win_a_start: sos - Duration::days(WINDOW_A_HALF_WIDTH_DAYS),
        win_a_end: sos + Duration::days(WINDOW_A_HALF_WIDTH_DAYS),
        win_b_start: eos - Duration::days(WINDOW_B_LEAD_DAYS),
        win_b_end: eos,
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| FtwError::InvalidDate {
        value: value.to_string(),
    })
}

pub fn calculate_window_dates_str(sos: &str, eos: &str) -> Result<SeasonWindows> {
    Ok(calculate_window_dates(parse_date(sos)?, parse_date(eos)?))
}
