// Solar rise/transit/set, NOAA closed form.
//
// Good to a couple of minutes at mid latitudes, which is well inside what
// a 67-byte radio message can express.  Polar day and night come out as
// explicit variants instead of fake timestamps.

use chrono::{DateTime, NaiveDate, Utc};

const J2000: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const OBLIQUITY_DEG: f64 = 23.4397;
/// Standard refraction-corrected altitude of the sun's center at rise/set.
const RISE_SET_ALTITUDE_DEG: f64 = -0.833;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SunEvent {
    RiseSet {
        rise: DateTime<Utc>,
        transit: DateTime<Utc>,
        set: DateTime<Utc>,
    },
    /// Polar day: the sun never drops below the horizon on this date.
    AlwaysUp,
    /// Polar night.
    AlwaysDown,
}

/// Sun events for a calendar date (UTC) at a coordinate (east-positive
/// longitude).
pub fn sun_times(lat: f64, lon: f64, date: NaiveDate) -> SunEvent {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default() as f64;
    let jd0 = midnight / 86_400.0 + UNIX_EPOCH_JD;
    let n = (jd0 - J2000 + 0.0008).round();

    // Mean solar time, shifted so transit lands near local noon.
    let jstar = n - lon / 360.0;
    let m = (357.5291 + 0.985_600_28 * jstar).rem_euclid(360.0);
    let m_rad = m.to_radians();
    let center = 1.9148 * m_rad.sin() + 0.02 * (2.0 * m_rad).sin() + 0.0003 * (3.0 * m_rad).sin();
    let ecliptic_lon = (m + center + 180.0 + 102.9372).rem_euclid(360.0);
    let el_rad = ecliptic_lon.to_radians();
    let j_transit =
        J2000 + jstar + 0.0053 * m_rad.sin() - 0.0069 * (2.0 * el_rad).sin();

    let declination = (el_rad.sin() * OBLIQUITY_DEG.to_radians().sin()).asin();
    let lat_rad = lat.to_radians();
    let cos_hour_angle = (RISE_SET_ALTITUDE_DEG.to_radians().sin()
        - lat_rad.sin() * declination.sin())
        / (lat_rad.cos() * declination.cos());

    if cos_hour_angle > 1.0 {
        return SunEvent::AlwaysDown;
    }
    if cos_hour_angle < -1.0 {
        return SunEvent::AlwaysUp;
    }

    let hour_angle_deg = cos_hour_angle.acos().to_degrees();
    SunEvent::RiseSet {
        rise: julian_to_utc(j_transit - hour_angle_deg / 360.0),
        transit: julian_to_utc(j_transit),
        set: julian_to_utc(j_transit + hour_angle_deg / 360.0),
    }
}

fn julian_to_utc(jd: f64) -> DateTime<Utc> {
    let secs = (jd - UNIX_EPOCH_JD) * 86_400.0;
    DateTime::from_timestamp(secs as i64, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn minutes_off(actual: DateTime<Utc>, expected: &str) -> i64 {
        let expected: DateTime<Utc> = expected.parse().unwrap();
        (actual - expected).num_minutes().abs()
    }

    #[test]
    fn london_summer_solstice() {
        let SunEvent::RiseSet { rise, transit, set } =
            sun_times(51.5074, -0.1278, date(2021, 6, 21))
        else {
            panic!("expected rise/set at 51N");
        };
        assert!(minutes_off(rise, "2021-06-21T03:43:00Z") <= 10, "rise {rise}");
        assert!(minutes_off(transit, "2021-06-21T12:02:00Z") <= 10, "transit {transit}");
        assert!(minutes_off(set, "2021-06-21T20:21:00Z") <= 10, "set {set}");
    }

    #[test]
    fn equator_has_near_twelve_hour_day() {
        let SunEvent::RiseSet { rise, set, .. } = sun_times(0.0, 0.0, date(2021, 3, 20)) else {
            panic!("expected rise/set at the equator");
        };
        let day_len = (set - rise).num_minutes();
        assert!((day_len - 12 * 60).abs() <= 15, "day length {day_len} min");
    }

    #[test]
    fn polar_day_and_night() {
        // Tromso in late June never sees the sun set...
        assert_eq!(sun_times(69.65, 18.95, date(2021, 6, 21)), SunEvent::AlwaysUp);
        // ...and never sees it rise around the winter solstice.
        assert_eq!(sun_times(69.65, 18.95, date(2021, 12, 21)), SunEvent::AlwaysDown);
    }

    #[test]
    fn eastern_longitudes_transit_earlier() {
        let SunEvent::RiseSet { transit: berlin, .. } =
            sun_times(52.52, 13.4, date(2021, 6, 21))
        else {
            panic!()
        };
        let SunEvent::RiseSet { transit: london, .. } =
            sun_times(51.5, -0.13, date(2021, 6, 21))
        else {
            panic!()
        };
        assert!(berlin < london);
    }
}
