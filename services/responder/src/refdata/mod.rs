//! Reference-data cache: airports, repeaters, satellite TLEs and
//! frequencies.
//!
//! Three on-disk files under the data directory, each with a `.stamp`
//! sidecar recording the last refresh.  The split follows
//! fetcher / parser / indexer: [`fetch`] downloads to a temp file and
//! renames, the per-domain modules parse their formats, and this module
//! holds the in-memory indexes the dispatcher and parser consult.
//!
//! Only the scheduler tick commits downloads; everyone else reads.

pub mod airports;
pub mod fetch;
pub mod repeaters;
pub mod satellites;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use crate::providers::orbital::TleSource;

pub use airports::{Airport, AirportIndex};
pub use repeaters::{Repeater, RepeaterIndex};
pub use satellites::{SatFrequency, SatIndex};

/// File names under the data directory.
pub const AIRPORTS_FILE: &str = "stations.txt";
pub const REPEATERS_FILE: &str = "repeaters.json";
pub const TLE_FILE: &str = "amateur.tle";
pub const FREQ_FILE: &str = "satfrequencies.csv";

/// Upstream locations for the refresh producer.
pub const AIRPORTS_URL: &str = "https://aviationweather.gov/data/cache/stations.cache.txt";
pub const REPEATERS_URL: &str = "https://repeatermap.de/api.php";
pub const TLE_URL: &str =
    "https://celestrak.org/NORAD/elements/gp.php?GROUP=amateur&FORMAT=tle";
pub const FREQ_URL: &str = "http://www.ne.jp/asahi/hamradio/je9pel/satslist.csv";

#[derive(Default)]
struct Inner {
    airports: AirportIndex,
    repeaters: RepeaterIndex,
    satellites: SatIndex,
}

/// Shared, reloadable view of the three reference files.
pub struct RefData {
    data_dir: PathBuf,
    inner: RwLock<Inner>,
}

impl RefData {
    /// Open the store and index whatever files already exist on disk.
    pub fn open(data_dir: &Path) -> Self {
        let store = RefData {
            data_dir: data_dir.to_owned(),
            inner: RwLock::new(Inner::default()),
        };
        store.reload_airports();
        store.reload_repeaters();
        store.reload_satellites();
        store
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    // -- reloads (called at startup and after each committed refresh) --

    pub fn reload_airports(&self) {
        match airports::load(&self.path_of(AIRPORTS_FILE)) {
            Ok(index) => {
                info!(airports = index.len(), "airport index loaded");
                self.inner.write().unwrap().airports = index;
            }
            Err(e) => warn!(error = %e, "airport catalog unavailable"),
        }
    }

    pub fn reload_repeaters(&self) {
        match repeaters::load(&self.path_of(REPEATERS_FILE)) {
            Ok(index) => {
                info!(repeaters = index.len(), "repeater index loaded");
                self.inner.write().unwrap().repeaters = index;
            }
            Err(e) => warn!(error = %e, "repeater directory unavailable"),
        }
    }

    pub fn reload_satellites(&self) {
        match satellites::load(&self.path_of(TLE_FILE), &self.path_of(FREQ_FILE)) {
            Ok(index) => {
                info!(satellites = index.len(), "satellite index loaded");
                self.inner.write().unwrap().satellites = index;
            }
            Err(e) => warn!(error = %e, "satellite tables unavailable"),
        }
    }

    // -- lookups --

    pub fn icao_codes(&self) -> HashSet<String> {
        self.inner.read().unwrap().airports.icao_codes()
    }

    pub fn iata_codes(&self) -> HashSet<String> {
        self.inner.read().unwrap().airports.iata_codes()
    }

    pub fn airport_by_icao(&self, icao: &str) -> Option<Airport> {
        self.inner.read().unwrap().airports.by_icao(icao)
    }

    pub fn airport_by_iata(&self, iata: &str) -> Option<Airport> {
        self.inner.read().unwrap().airports.by_iata(iata)
    }

    /// Nearest METAR-capable airport.
    pub fn nearest_airport(&self, lat: f64, lon: f64) -> Option<Airport> {
        self.inner.read().unwrap().airports.nearest(lat, lon)
    }

    pub fn satellite_names(&self) -> HashSet<String> {
        self.inner.read().unwrap().satellites.names()
    }

    pub fn satellite_frequencies(&self, name: &str) -> Vec<SatFrequency> {
        self.inner.read().unwrap().satellites.frequencies(name)
    }

    pub fn repeaters_near(
        &self,
        lat: f64,
        lon: f64,
        band: Option<&str>,
        mode: Option<&str>,
        limit: usize,
    ) -> Vec<(Repeater, f64)> {
        self.inner
            .read()
            .unwrap()
            .repeaters
            .nearest(lat, lon, band, mode, limit)
    }
}

impl TleSource for RefData {
    fn tle(&self, name: &str) -> Option<(String, String)> {
        self.inner.read().unwrap().satellites.tle(name)
    }
}
