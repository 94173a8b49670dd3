// UTM and MGRS conversion (Krueger series, WGS84).
//
// Transverse-Mercator accuracy of the third-order series is well below a
// meter inside a zone, which is far tighter than anything we print on a
// 67-byte radio payload.

use thiserror::Error;

const K0: f64 = 0.9996;
const E0: f64 = 500_000.0;
const N0_SOUTH: f64 = 10_000_000.0;

// WGS84
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;

// Latitude bands C..X, 8° each from 80°S; no I or O.
const BANDS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";
// 100 km square letters; columns cycle through 24, rows through 20.
const MGRS_COLS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const MGRS_ROWS: &[u8] = b"ABCDEFGHJKLMNPQRSTUV";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UtmError {
    #[error("latitude outside the UTM domain (80S..84N)")]
    OutsideDomain,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    pub zone: u32,
    pub band: char,
    pub easting: f64,
    pub northing: f64,
}

/// UTM zone for a coordinate, including the Norway and Svalbard carve-outs.
fn zone_for(lat: f64, lon: f64) -> u32 {
    if (55.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
        return 32;
    }
    if lat >= 72.0 {
        match lon {
            l if (0.0..9.0).contains(&l) => return 31,
            l if (9.0..21.0).contains(&l) => return 33,
            l if (21.0..33.0).contains(&l) => return 35,
            l if (33.0..42.0).contains(&l) => return 37,
            _ => {}
        }
    }
    (((lon + 180.0) / 6.0).floor() as u32 % 60) + 1
}

fn band_for(lat: f64) -> char {
    let idx = (((lat + 80.0) / 8.0).floor() as isize).clamp(0, 19) as usize;
    BANDS[idx] as char
}

/// Project a coordinate into its UTM zone.
pub fn to_utm(lat: f64, lon: f64) -> Result<Utm, UtmError> {
    if !(-80.0..=84.0).contains(&lat) {
        return Err(UtmError::OutsideDomain);
    }
    let zone = zone_for(lat, lon);
    let band = band_for(lat);
    let central = (zone as f64) * 6.0 - 183.0;

    let n = F / (2.0 - F);
    let n2 = n * n;
    let n3 = n2 * n;
    let radius = A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
    let a1 = n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0;
    let a2 = 13.0 * n2 / 48.0 - 3.0 * n3 / 5.0;
    let a3 = 61.0 * n3 / 240.0;

    let phi = lat.to_radians();
    let dlam = (lon - central).to_radians();

    let c = 2.0 * n.sqrt() / (1.0 + n);
    let t = (phi.sin().atanh() - c * (c * phi.sin()).atanh()).sinh();
    let xi = (t / dlam.cos()).atan();
    let eta = (dlam.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut easting = eta;
    let mut northing = xi;
    for (j, aj) in [a1, a2, a3].into_iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        easting += aj * (k * xi).cos() * (k * eta).sinh();
        northing += aj * (k * xi).sin() * (k * eta).cosh();
    }
    easting = E0 + K0 * radius * easting;
    northing = K0 * radius * northing;
    if lat < 0.0 {
        northing += N0_SOUTH;
    }

    Ok(Utm {
        zone,
        band,
        easting,
        northing,
    })
}

impl std::fmt::Display for Utm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} {:.0} {:.0}",
            self.zone, self.band, self.easting, self.northing
        )
    }
}

/// Render a coordinate as a 10-meter MGRS reference (`31UDQ48251193`).
pub fn to_mgrs(lat: f64, lon: f64) -> Result<String, UtmError> {
    let utm = to_utm(lat, lon)?;
    let col_start = ((utm.zone - 1) % 3) * 8;
    let col_idx = (utm.easting / 100_000.0).floor() as u32;
    let col = MGRS_COLS[((col_start + col_idx - 1) % 24) as usize] as char;
    let row_offset = if utm.zone % 2 == 0 { 5 } else { 0 };
    let row_idx = ((utm.northing / 100_000.0).floor() as u32 + row_offset) % 20;
    let row = MGRS_ROWS[row_idx as usize] as char;
    let e10 = ((utm.easting % 100_000.0) / 10.0).floor() as u32;
    let n10 = ((utm.northing % 100_000.0) / 10.0).floor() as u32;
    Ok(format!(
        "{}{}{}{} {:04}{:04}",
        utm.zone, utm.band, col, row, e10, n10
    ))
}
