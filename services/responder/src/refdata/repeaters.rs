// Repeater directory (repeatermap JSON) and nearest-match queries.
//
// The feed lists every repeater with coordinates, frequency and mode.
// Band is derived from the output frequency, so `70cm` filters work even
// though the feed itself never says "70cm".

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Repeater {
    pub call: String,
    pub lat: f64,
    pub lon: f64,
    pub frequency_mhz: f64,
    pub mode: String,
    pub city: String,
}

impl Repeater {
    pub fn band(&self) -> Option<&'static str> {
        band_of(self.frequency_mhz)
    }
}

/// Amateur band name for an output frequency.
pub fn band_of(mhz: f64) -> Option<&'static str> {
    match mhz {
        f if (28.0..30.0).contains(&f) => Some("10m"),
        f if (50.0..54.0).contains(&f) => Some("6m"),
        f if (144.0..148.0).contains(&f) => Some("2m"),
        f if (219.0..225.0).contains(&f) => Some("125cm"),
        f if (420.0..450.0).contains(&f) => Some("70cm"),
        f if (902.0..928.0).contains(&f) => Some("33cm"),
        f if (1240.0..1300.0).contains(&f) => Some("23cm"),
        _ => None,
    }
}

#[derive(Default)]
pub struct RepeaterIndex {
    repeaters: Vec<Repeater>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    relais: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    call: String,
    lat: Option<f64>,
    lon: Option<f64>,
    qrg: Option<serde_json::Value>,
    mode: Option<String>,
    city: Option<String>,
}

impl Entry {
    fn into_repeater(self) -> Option<Repeater> {
        let frequency_mhz = match self.qrg? {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(Repeater {
            call: self.call,
            lat: self.lat?,
            lon: self.lon?,
            frequency_mhz,
            mode: self.mode.unwrap_or_default().to_lowercase(),
            city: self.city.unwrap_or_default(),
        })
    }
}

pub fn load(path: &Path) -> std::io::Result<RepeaterIndex> {
    let text = std::fs::read_to_string(path)?;
    parse(&text).map_err(std::io::Error::other)
}

pub fn parse(text: &str) -> Result<RepeaterIndex, serde_json::Error> {
    let feed: Feed = serde_json::from_str(text)?;
    Ok(RepeaterIndex {
        repeaters: feed
            .relais
            .into_iter()
            .filter_map(Entry::into_repeater)
            .collect(),
    })
}

impl RepeaterIndex {
    pub fn len(&self) -> usize {
        self.repeaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repeaters.is_empty()
    }

    /// Nearest repeaters with optional band/mode filters, paired with
    /// their distance in kilometers.
    pub fn nearest(
        &self,
        lat: f64,
        lon: f64,
        band: Option<&str>,
        mode: Option<&str>,
        limit: usize,
    ) -> Vec<(Repeater, f64)> {
        let mut hits: Vec<(Repeater, f64)> = self
            .repeaters
            .iter()
            .filter(|r| match band {
                Some(b) => r.band().map(|rb| rb.eq_ignore_ascii_case(b)).unwrap_or(false),
                None => true,
            })
            .filter(|r| match mode {
                Some(m) => r.mode.eq_ignore_ascii_case(m),
                None => true,
            })
            .map(|r| (r.clone(), ab_geo::distance_km(lat, lon, r.lat, r.lon)))
            .collect();
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}
