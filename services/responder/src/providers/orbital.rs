// Satellite pass computation (SGP4 over cached TLEs).
//
// Propagation runs on a blocking worker; the scan walks forward in
// one-minute steps until the elevation rises through the threshold, then
// refines AOS/LOS at five-second resolution.  Geometry is TEME rotated by
// GMST into ECEF, then a topocentric east/north/up decomposition.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{PassProvider, ProviderError, ProviderResult, SatPass};

/// Where TLEs come from (the reference-data index in production).
pub trait TleSource: Send + Sync {
    /// Both TLE lines for a satellite, by lowercase dash-joined name.
    fn tle(&self, name: &str) -> Option<(String, String)>;
}

/// How far ahead to search for a pass.
const SEARCH_HORIZON_HOURS: i64 = 48;
const COARSE_STEP_SECS: i64 = 60;
const FINE_STEP_SECS: i64 = 5;

const EARTH_RADIUS_KM: f64 = 6378.137;
const E2: f64 = 0.006_694_379_990_14;

pub struct Sgp4Passes<T: TleSource> {
    tles: std::sync::Arc<T>,
}

impl<T: TleSource> Sgp4Passes<T> {
    pub fn new(tles: std::sync::Arc<T>) -> Self {
        Sgp4Passes { tles }
    }
}

#[async_trait]
impl<T: TleSource + 'static> PassProvider for Sgp4Passes<T> {
    async fn next_pass(
        &self,
        satellite: &str,
        from: DateTime<Utc>,
        lat: f64,
        lon: f64,
        min_elevation_deg: f64,
        visual_only: bool,
    ) -> ProviderResult<SatPass> {
        let (line1, line2) = self
            .tles
            .tle(satellite)
            .ok_or(ProviderError::NotFound)?;
        let name = satellite.to_owned();
        tokio::task::spawn_blocking(move || {
            compute_next_pass(&name, &line1, &line2, from, lat, lon, min_elevation_deg, visual_only)
        })
        .await
        .map_err(|e| ProviderError::Unavailable(format!("worker: {e}")))?
    }
}

#[allow(clippy::too_many_arguments)]
fn compute_next_pass(
    name: &str,
    line1: &str,
    line2: &str,
    from: DateTime<Utc>,
    lat: f64,
    lon: f64,
    min_elevation_deg: f64,
    visual_only: bool,
) -> ProviderResult<SatPass> {
    let elements = sgp4::Elements::from_tle(
        Some(name.to_owned()),
        line1.as_bytes(),
        line2.as_bytes(),
    )
    .map_err(|e| ProviderError::Unavailable(format!("bad TLE: {e}")))?;
    let constants = sgp4::Constants::from_elements(&elements)
        .map_err(|e| ProviderError::Unavailable(format!("sgp4 init: {e}")))?;

    let observer = Observer::new(lat, lon);
    let elevation_at = |t: DateTime<Utc>| -> ProviderResult<Look> {
        let minutes = elements
            .datetime_to_minutes_since_epoch(&t.naive_utc())
            .map_err(|e| ProviderError::Unavailable(format!("epoch: {e}")))?;
        let prediction = constants
            .propagate(minutes)
            .map_err(|e| ProviderError::Unavailable(format!("propagate: {e}")))?;
        Ok(observer.look_at(prediction.position, t))
    };

    let horizon = from + Duration::hours(SEARCH_HORIZON_HOURS);
    let mut t = from;
    let mut prev_up = elevation_at(t)?.elevation_deg >= min_elevation_deg;

    while t < horizon {
        let next = t + Duration::seconds(COARSE_STEP_SECS);
        let look = elevation_at(next)?;
        let up = look.elevation_deg >= min_elevation_deg;
        if up && !prev_up {
            // Rising edge inside (t, next]; refine AOS, then walk out the
            // whole pass.
            let aos = refine_crossing(&elevation_at, t, next, min_elevation_deg)?;
            let pass = walk_pass(&elevation_at, aos, min_elevation_deg, horizon)?;
            let visible = pass_visible(&elevation_at, &observer, &pass)?;
            if !visual_only || visible {
                return Ok(SatPass {
                    satellite: name.to_owned(),
                    visible,
                    ..pass
                });
            }
            t = pass.los;
            prev_up = false;
            continue;
        }
        prev_up = up;
        t = next;
    }
    Err(ProviderError::Empty)
}

struct Pass {
    aos: DateTime<Utc>,
    los: DateTime<Utc>,
    max_elevation_deg: f64,
    aos_azimuth_deg: f64,
    los_azimuth_deg: f64,
}

impl Pass {
    fn into_sat_pass(self) -> SatPass {
        SatPass {
            satellite: String::new(),
            aos: self.aos,
            los: self.los,
            max_elevation_deg: self.max_elevation_deg,
            aos_azimuth_deg: self.aos_azimuth_deg,
            los_azimuth_deg: self.los_azimuth_deg,
            visible: false,
        }
    }
}

fn refine_crossing(
    elevation_at: &impl Fn(DateTime<Utc>) -> ProviderResult<Look>,
    mut below: DateTime<Utc>,
    above: DateTime<Utc>,
    threshold: f64,
) -> ProviderResult<DateTime<Utc>> {
    let mut t = below;
    while t < above {
        t += Duration::seconds(FINE_STEP_SECS);
        if elevation_at(t)?.elevation_deg >= threshold {
            return Ok(t);
        }
        below = t;
    }
    Ok(below)
}

fn walk_pass(
    elevation_at: &impl Fn(DateTime<Utc>) -> ProviderResult<Look>,
    aos: DateTime<Utc>,
    threshold: f64,
    horizon: DateTime<Utc>,
) -> ProviderResult<SatPass> {
    let aos_look = elevation_at(aos)?;
    let mut max_elevation = aos_look.elevation_deg;
    let mut t = aos;
    loop {
        let next = t + Duration::seconds(FINE_STEP_SECS);
        if next >= horizon {
            break;
        }
        let look = elevation_at(next)?;
        if look.elevation_deg < threshold {
            break;
        }
        max_elevation = max_elevation.max(look.elevation_deg);
        t = next;
    }
    let los_look = elevation_at(t)?;
    Ok(Pass {
        aos,
        los: t,
        max_elevation_deg: max_elevation,
        aos_azimuth_deg: aos_look.azimuth_deg,
        los_azimuth_deg: los_look.azimuth_deg,
    }
    .into_sat_pass())
}

/// Visible means: observer in (at least nautical) darkness while the
/// satellite is still sunlit, checked at the middle of the pass.
fn pass_visible(
    elevation_at: &impl Fn(DateTime<Utc>) -> ProviderResult<Look>,
    observer: &Observer,
    pass: &SatPass,
) -> ProviderResult<bool> {
    let mid = pass.aos + (pass.los - pass.aos) / 2;
    let look = elevation_at(mid)?;
    let sun_eci = sun_direction(mid);
    let sun_elev = observer.direction_elevation_deg(sun_eci, mid);
    // The shadow test compares against the satellite's ECEF position, so
    // rotate the sun into the same frame first.
    let theta = gmst_rad(mid);
    let (s, c) = theta.sin_cos();
    let sun_ecef = [
        sun_eci[0] * c + sun_eci[1] * s,
        -sun_eci[0] * s + sun_eci[1] * c,
        sun_eci[2],
    ];
    Ok(sun_elev < -6.0 && look.sunlit(sun_ecef))
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

struct Observer {
    lat_rad: f64,
    lon_rad: f64,
    ecef: [f64; 3],
}

struct Look {
    elevation_deg: f64,
    azimuth_deg: f64,
    sat_ecef: [f64; 3],
}

impl Look {
    /// Sunlit unless inside the cylindrical Earth shadow.
    fn sunlit(&self, sun_dir: [f64; 3]) -> bool {
        let r = self.sat_ecef;
        let along = dot(r, sun_dir);
        if along > 0.0 {
            return true;
        }
        let perp2 = dot(r, r) - along * along;
        perp2.sqrt() > EARTH_RADIUS_KM
    }
}

impl Observer {
    fn new(lat: f64, lon: f64) -> Self {
        let lat_rad = lat.to_radians();
        let lon_rad = lon.to_radians();
        let n = EARTH_RADIUS_KM / (1.0 - E2 * lat_rad.sin().powi(2)).sqrt();
        Observer {
            lat_rad,
            lon_rad,
            ecef: [
                n * lat_rad.cos() * lon_rad.cos(),
                n * lat_rad.cos() * lon_rad.sin(),
                n * (1.0 - E2) * lat_rad.sin(),
            ],
        }
    }

    /// Topocentric look angles for a TEME position at time `t`.
    fn look_at(&self, teme_km: [f64; 3], t: DateTime<Utc>) -> Look {
        let theta = gmst_rad(t);
        let (s, c) = theta.sin_cos();
        let sat_ecef = [
            teme_km[0] * c + teme_km[1] * s,
            -teme_km[0] * s + teme_km[1] * c,
            teme_km[2],
        ];
        let range = [
            sat_ecef[0] - self.ecef[0],
            sat_ecef[1] - self.ecef[1],
            sat_ecef[2] - self.ecef[2],
        ];
        let (up, east, north) = self.frame();
        let r_up = dot(range, up);
        let r_east = dot(range, east);
        let r_north = dot(range, north);
        let norm = dot(range, range).sqrt();
        Look {
            elevation_deg: (r_up / norm).asin().to_degrees(),
            azimuth_deg: r_east.atan2(r_north).to_degrees().rem_euclid(360.0),
            sat_ecef,
        }
    }

    /// Elevation of a fixed direction (e.g. the sun) above this observer's
    /// horizon at time `t`; the direction is given in ECI and rotated.
    fn direction_elevation_deg(&self, eci_dir: [f64; 3], t: DateTime<Utc>) -> f64 {
        let theta = gmst_rad(t);
        let (s, c) = theta.sin_cos();
        let ecef = [
            eci_dir[0] * c + eci_dir[1] * s,
            -eci_dir[0] * s + eci_dir[1] * c,
            eci_dir[2],
        ];
        let (up, _, _) = self.frame();
        dot(ecef, up).asin().to_degrees()
    }

    fn frame(&self) -> ([f64; 3], [f64; 3], [f64; 3]) {
        let (slat, clat) = self.lat_rad.sin_cos();
        let (slon, clon) = self.lon_rad.sin_cos();
        let up = [clat * clon, clat * slon, slat];
        let east = [-slon, clon, 0.0];
        let north = [-slat * clon, -slat * slon, clat];
        (up, east, north)
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Greenwich mean sidereal time, radians.
fn gmst_rad(t: DateTime<Utc>) -> f64 {
    let days = (t.timestamp() as f64 + f64::from(t.timestamp_subsec_millis()) / 1000.0)
        / 86_400.0
        - 10_957.5;
    (280.460_618_37 + 360.985_647_366_29 * days)
        .rem_euclid(360.0)
        .to_radians()
}

/// Unit vector toward the sun in ECI, low-precision ecliptic model.
fn sun_direction(t: DateTime<Utc>) -> [f64; 3] {
    let d = t.timestamp() as f64 / 86_400.0 - 10_957.5;
    let m = (357.529 + 0.985_600_28 * d).rem_euclid(360.0).to_radians();
    let l = (280.459 + 0.985_647_36 * d).rem_euclid(360.0);
    let lambda = (l + 1.915 * m.sin() + 0.020 * (2.0 * m).sin()).to_radians();
    let eps = 23.439_f64.to_radians();
    [
        lambda.cos(),
        eps.cos() * lambda.sin(),
        eps.sin() * lambda.sin(),
    ]
}
