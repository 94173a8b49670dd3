// Satellite TLE + frequency tables.
//
// TLEs arrive as three-line groups (name, line 1, line 2).  Frequencies
// come from the JE9PEL list, a semicolon-separated CSV.  Names are
// normalized to lowercase with dashes so `AO-91`, `FOX-1B (AO-91)` and
// user input all land on the same keys; a parenthesized alias indexes
// the same entry twice.

use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatFrequency {
    pub uplink: String,
    pub downlink: String,
    pub beacon: String,
    pub mode: String,
}

#[derive(Default)]
pub struct SatIndex {
    tles: HashMap<String, (String, String)>,
    frequencies: HashMap<String, Vec<SatFrequency>>,
}

/// Normalize a satellite designator for index keys.
pub fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "-")
}

/// All index keys for a TLE title line, base name plus parenthesized
/// alias: `FOX-1B (AO-91)` keys both `fox-1b` and `ao-91`.
fn keys_for(title: &str) -> Vec<String> {
    let title = title.trim();
    match title.split_once('(') {
        Some((base, alias)) => {
            let alias = alias.trim_end_matches(')');
            vec![normalize(base), normalize(alias)]
        }
        None => vec![normalize(title)],
    }
}

pub fn load(tle_path: &Path, freq_path: &Path) -> std::io::Result<SatIndex> {
    let tle_text = std::fs::read_to_string(tle_path)?;
    let mut index = parse_tles(&tle_text);
    // The frequency table is optional garnish; a missing file only
    // disables the satfreq answers.
    if let Ok(freq_text) = std::fs::read_to_string(freq_path) {
        index.frequencies = parse_frequencies(&freq_text);
    }
    Ok(index)
}

pub fn parse_tles(text: &str) -> SatIndex {
    let mut index = SatIndex::default();
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let mut i = 0;
    while i < lines.len() {
        let (title, l1, l2) = match (lines.get(i), lines.get(i + 1), lines.get(i + 2)) {
            (Some(t), Some(a), Some(b)) if a.starts_with("1 ") && b.starts_with("2 ") => {
                (t, a, b)
            }
            _ => {
                i += 1;
                continue;
            }
        };
        for key in keys_for(title) {
            index
                .tles
                .insert(key, ((*l1).to_owned(), (*l2).to_owned()));
        }
        i += 3;
    }
    index
}

/// JE9PEL columns: name;number;uplink;downlink;beacon;mode;callsign;status.
pub fn parse_frequencies(text: &str) -> HashMap<String, Vec<SatFrequency>> {
    let mut map: HashMap<String, Vec<SatFrequency>> = HashMap::new();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    for record in reader.records().flatten() {
        let name = match record.get(0) {
            Some(n) if !n.trim().is_empty() => n,
            _ => continue,
        };
        let active = record
            .get(7)
            .map(|s| s.trim().eq_ignore_ascii_case("active"))
            .unwrap_or(false);
        if !active {
            continue;
        }
        let field = |i: usize| record.get(i).unwrap_or_default().trim().to_owned();
        let entry = SatFrequency {
            uplink: field(2),
            downlink: field(3),
            beacon: field(4),
            mode: field(5),
        };
        for key in keys_for(name) {
            map.entry(key).or_default().push(entry.clone());
        }
    }
    map
}

impl SatIndex {
    pub fn len(&self) -> usize {
        self.tles.len()
    }

    pub fn names(&self) -> HashSet<String> {
        self.tles.keys().cloned().collect()
    }

    pub fn tle(&self, name: &str) -> Option<(String, String)> {
        self.tles.get(&normalize(name)).cloned()
    }

    pub fn frequencies(&self, name: &str) -> Vec<SatFrequency> {
        self.frequencies
            .get(&normalize(name))
            .cloned()
            .unwrap_or_default()
    }
}
