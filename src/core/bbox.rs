use crate::core::reproject::BuiltinTransform;
use crate::domain::model::{Crs, GeoPoint, ParsedBbox};
use crate::domain::ports::CoordinateTransform;
use crate::utils::error::{FtwError, Result};

/// Raw corners as typed, before reprojection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBbox {
    pub top_left: (f64, f64),
    pub bottom_right: (f64, f64),
    pub crs: Crs,
}

/// 解析 "lon,lat; lon,lat [EPSG:xxxx]"，並轉換為 WGS84
pub fn parse_coordinates(text: &str) -> Result<ParsedBbox> {
    let raw = parse_raw(text)?;
    let transform = BuiltinTransform::new(raw.crs);
    Ok(to_wgs84(&raw, &transform))
}

/// Same as [`parse_coordinates`] but with a caller-supplied transform.
pub fn parse_coordinates_with(
    text: &str,
    transform: &dyn CoordinateTransform,
) -> Result<ParsedBbox> {
    let raw = parse_raw(text)?;
    Ok(to_wgs84(&raw, transform))
}

pub fn parse_raw(text: &str) -> Result<RawBbox> {
    let invalid = |reason: &str| FtwError::InvalidCoordinates {
        input: text.to_string(),
        reason: reason.to_string(),
    };

    let (coords_part, crs) = match text.split_once('[') {
        Some((coords, rest)) => {
            let code = rest
                .trim()
                .strip_suffix(']')
                .ok_or_else(|| invalid("missing closing ']'"))?
                .trim();
            if code.is_empty() {
                return Err(invalid("empty CRS code"));
            }
            let crs = Crs::from_authority(code).ok_or_else(|| FtwError::UnsupportedCrs {
                crs: code.to_string(),
            })?;
            (coords.trim(), crs)
        }
        None => (text.trim(), Crs::Wgs84),
    };

    let (top_left, bottom_right) = coords_part
        .split_once(';')
        .ok_or_else(|| invalid("expected two corners separated by ';'"))?;
    if bottom_right.contains(';') {
        return Err(invalid("expected exactly two corners"));
    }

    Ok(RawBbox {
        top_left: parse_pair(top_left).map_err(|reason| invalid(&reason))?,
        bottom_right: parse_pair(bottom_right).map_err(|reason| invalid(&reason))?,
        crs,
    })
}

fn parse_pair(pair: &str) -> std::result::Result<(f64, f64), String> {
    let mut parts = pair.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("'{}' is not a 'lon,lat' pair", pair.trim()));
    };
    let parse = |s: &str| -> std::result::Result<f64, String> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a number", s.trim()))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("'{}' is not finite", s.trim()))
        }
    };
    Ok((parse(x)?, parse(y)?))
}

fn to_wgs84(raw: &RawBbox, transform: &dyn CoordinateTransform) -> ParsedBbox {
    let (top_left, bottom_right) = if raw.crs.is_geographic() {
        (
            GeoPoint::new(raw.top_left.0, raw.top_left.1),
            GeoPoint::new(raw.bottom_right.0, raw.bottom_right.1),
        )
    } else {
        (
            transform.to_wgs84(raw.top_left.0, raw.top_left.1),
            transform.to_wgs84(raw.bottom_right.0, raw.bottom_right.1),
        )
    };

    ParsedBbox {
        center: GeoPoint::new(
            (top_left.lon + bottom_right.lon) / 2.0,
            (top_left.lat + bottom_right.lat) / 2.0,
        ),
        top_left,
        bottom_right,
    }
}

pub fn format_coordinates(top_left: (f64, f64), bottom_right: (f64, f64), crs: Crs) -> String {
    format!(
        "{},{}; {},{} [{}]",
        top_left.0, top_left.1, bottom_right.0, bottom_right.1, crs
    )
}
