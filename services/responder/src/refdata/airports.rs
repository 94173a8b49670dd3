// Airport catalog parser and index (NOAA station table).
//
// The station table is fixed-width text; the columns used here are the
// ICAO and IATA identifiers, the degree/minute coordinates, and the
// METAR capability flag.  Comment lines start with `!`, header and
// separator lines fail the coordinate parse and fall out naturally.

use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Airport {
    pub icao: String,
    pub iata: Option<String>,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub has_metar: bool,
}

#[derive(Default)]
pub struct AirportIndex {
    by_icao: HashMap<String, Airport>,
    iata_to_icao: HashMap<String, String>,
}

pub fn load(path: &Path) -> std::io::Result<AirportIndex> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse(&text))
}

pub fn parse(text: &str) -> AirportIndex {
    let mut index = AirportIndex::default();
    for line in text.lines() {
        if let Some(airport) = parse_line(line) {
            if let Some(iata) = &airport.iata {
                index
                    .iata_to_icao
                    .insert(iata.clone(), airport.icao.clone());
            }
            index.by_icao.insert(airport.icao.clone(), airport);
        }
    }
    index
}

fn parse_line(line: &str) -> Option<Airport> {
    if line.starts_with('!') || line.len() < 63 {
        return None;
    }
    let icao = line.get(20..24)?.trim();
    if icao.len() != 4 || !icao.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let iata = line.get(26..29)?.trim();
    let lat = parse_coord(line.get(39..45)?, 'N', 'S')?;
    let lon = parse_coord(line.get(47..54)?, 'E', 'W')?;
    let name = line.get(3..19)?.trim().to_owned();
    let has_metar = line.get(62..63) == Some("X");

    Some(Airport {
        icao: icao.to_owned(),
        iata: (iata.len() == 3).then(|| iata.to_owned()),
        name,
        lat,
        lon,
        has_metar,
    })
}

/// `51 53N` / `176 39W` degree-minute-hemisphere fields.
fn parse_coord(field: &str, positive: char, negative: char) -> Option<f64> {
    let field = field.trim();
    let hemi = field.chars().last()?;
    let sign = if hemi == positive {
        1.0
    } else if hemi == negative {
        -1.0
    } else {
        return None;
    };
    let (deg, min) = field[..field.len() - 1].trim().split_once(' ')?;
    let deg: f64 = deg.trim().parse().ok()?;
    let min: f64 = min.trim().parse().ok()?;
    Some(sign * (deg + min / 60.0))
}

impl AirportIndex {
    pub fn len(&self) -> usize {
        self.by_icao.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_icao.is_empty()
    }

    pub fn icao_codes(&self) -> HashSet<String> {
        self.by_icao.keys().map(|k| k.to_lowercase()).collect()
    }

    pub fn iata_codes(&self) -> HashSet<String> {
        self.iata_to_icao.keys().map(|k| k.to_lowercase()).collect()
    }

    pub fn by_icao(&self, icao: &str) -> Option<Airport> {
        self.by_icao.get(&icao.to_uppercase()).cloned()
    }

    pub fn by_iata(&self, iata: &str) -> Option<Airport> {
        let icao = self.iata_to_icao.get(&iata.to_uppercase())?;
        self.by_icao.get(icao).cloned()
    }

    /// Nearest METAR-capable airport to a coordinate.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<Airport> {
        self.by_icao
            .values()
            .filter(|a| a.has_metar)
            .min_by(|a, b| {
                let da = ab_geo::distance_km(lat, lon, a.lat, a.lon);
                let db = ab_geo::distance_km(lat, lon, b.lat, b.lon);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }
}
