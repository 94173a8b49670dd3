// APRS position encoding for the periodic beacon.
//
// Coordinates travel in the classic fixed-width APRS forms: latitude
// `ddmm.ssN`, longitude `dddmm.ssE`, altitude `/A=nnnnnn` in feet.  The
// station configuration already carries lat/lon in those strings; the
// converters below exist for validation and for building them from
// decimal degrees in tests.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("latitude out of range")]
    LatitudeRange,
    #[error("longitude out of range")]
    LongitudeRange,
    #[error("malformed fixed-width coordinate: {0}")]
    Malformed(String),
}

/// Encode decimal degrees latitude as `ddmm.ssN` / `ddmm.ssS`.
pub fn encode_latitude(lat: f64) -> Result<String, PositionError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(PositionError::LatitudeRange);
    }
    let hemi = if lat < 0.0 { 'S' } else { 'N' };
    let abs = lat.abs();
    let deg = abs.trunc() as u32;
    let min = (abs - deg as f64) * 60.0;
    Ok(format!("{deg:02}{min:05.2}{hemi}"))
}

/// Encode decimal degrees longitude as `dddmm.ssE` / `dddmm.ssW`.
pub fn encode_longitude(lon: f64) -> Result<String, PositionError> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(PositionError::LongitudeRange);
    }
    let hemi = if lon < 0.0 { 'W' } else { 'E' };
    let abs = lon.abs();
    let deg = abs.trunc() as u32;
    let min = (abs - deg as f64) * 60.0;
    Ok(format!("{deg:03}{min:05.2}{hemi}"))
}

/// Decode a fixed-width latitude back to decimal degrees.
pub fn decode_latitude(s: &str) -> Result<f64, PositionError> {
    let err = || PositionError::Malformed(s.to_owned());
    if s.len() != 8 {
        return Err(err());
    }
    let deg: f64 = s[..2].parse().map_err(|_| err())?;
    let min: f64 = s[2..7].parse().map_err(|_| err())?;
    let sign = match &s[7..8] {
        "N" => 1.0,
        "S" => -1.0,
        _ => return Err(err()),
    };
    Ok(sign * (deg + min / 60.0))
}

/// Decode a fixed-width longitude back to decimal degrees.
pub fn decode_longitude(s: &str) -> Result<f64, PositionError> {
    let err = || PositionError::Malformed(s.to_owned());
    if s.len() != 9 {
        return Err(err());
    }
    let deg: f64 = s[..3].parse().map_err(|_| err())?;
    let min: f64 = s[3..8].parse().map_err(|_| err())?;
    let sign = match &s[8..9] {
        "E" => 1.0,
        "W" => -1.0,
        _ => return Err(err()),
    };
    Ok(sign * (deg + min / 60.0))
}

/// Build the beacon information field.
///
/// `=LAT{table}LON{symbol}ALIAS/A=nnnnnn AGENT VERSION`; position without
/// timestamp, primary/alternate symbol table selector between the
/// coordinates, altitude in feet zero-padded to six digits.
pub fn beacon_payload(
    latitude: &str,
    longitude: &str,
    symbol_table: char,
    symbol_code: char,
    alias: &str,
    altitude_ft: u32,
    agent: &str,
    version: &str,
) -> String {
    format!(
        "={latitude}{symbol_table}{longitude}{symbol_code}{alias}/A={altitude_ft:06} {agent} {version}"
    )
}
