//! Provider collaborators.
//!
//! Each external data source sits behind a trait with a typed record on
//! the happy path and a [`ProviderError`] kind on failure.  The dispatcher
//! owns retries and the translation of error kinds into user-visible
//! text; clients here do one attempt and report what happened.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub mod aprsfi;
pub mod aviation;
pub mod celestial;
pub mod cwop;
pub mod dapnet;
pub mod fortune;
pub mod geocode;
pub mod mail;
pub mod orbital;
pub mod severewx;
pub mod sonde;
pub mod wx;

/// Failure taxonomy shared by every provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Timeout, connection failure, non-2xx, quota exceeded.  The
    /// dispatcher retries these once.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The requested place/station/object does not resolve.
    #[error("not found")]
    NotFound,
    /// The query worked but matched nothing (e.g. no repeater in range).
    #[error("empty result")]
    Empty,
    /// Feature switched off by a configuration sentinel.
    #[error("disabled by configuration")]
    Disabled,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One forecast day in provider-local terms.  Temperatures are already in
/// the requested unit system; the summary is already localized.
#[derive(Debug, Clone, PartialEq)]
pub struct WxDay {
    /// Local calendar date at the target.
    pub date: NaiveDate,
    pub summary: String,
    pub temp_morn: f64,
    pub temp_day: f64,
    pub temp_eve: f64,
    pub temp_night: f64,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub clouds_pct: u8,
    pub uvi: f64,
    pub pressure_hpa: u32,
    pub humidity_pct: u8,
    pub dew_point: f64,
    pub wind_speed: f64,
    pub wind_deg: u16,
}

/// One forecast hour.
#[derive(Debug, Clone, PartialEq)]
pub struct WxHour {
    pub time: DateTime<Utc>,
    pub summary: String,
    pub temp: f64,
}

/// Full forecast payload for one coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct WxForecast {
    /// Seconds east of UTC at the target; used to project daytime windows.
    pub utc_offset_secs: i32,
    pub days: Vec<WxDay>,
    pub hours: Vec<WxHour>,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(
        &self,
        lat: f64,
        lon: f64,
        metric: bool,
        lang: &str,
    ) -> ProviderResult<WxForecast>;
}

/// Last-heard position of a station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationPosition {
    pub callsign: String,
    pub lat: f64,
    pub lon: f64,
    pub last_heard: DateTime<Utc>,
    pub comment: Option<String>,
}

#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn position(&self, callsign: &str) -> ProviderResult<StationPosition>;
}

/// A resolved place.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPlace {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn by_city(
        &self,
        city: &str,
        state: Option<&str>,
        country: &str,
    ) -> ProviderResult<GeoPlace>;
    async fn by_zip(&self, code: &str, country: &str) -> ProviderResult<GeoPlace>;
    /// Human-readable address for a coordinate.
    async fn reverse(&self, lat: f64, lon: f64) -> ProviderResult<String>;
    /// Nearby OSM objects of one category, nearest first.
    async fn nearby(
        &self,
        lat: f64,
        lon: f64,
        category: &str,
        limit: usize,
    ) -> ProviderResult<Vec<GeoPlace>>;
}

#[async_trait]
pub trait AviationProvider: Send + Sync {
    /// Latest METAR observation text for an ICAO identifier.
    async fn metar(&self, icao: &str) -> ProviderResult<String>;
    /// Latest TAF text for an ICAO identifier.
    async fn taf(&self, icao: &str) -> ProviderResult<String>;
}

/// Citizen-weather station observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CwopReport {
    pub station: String,
    pub time: DateTime<Utc>,
    pub temp_c: Option<f64>,
    pub wind_deg: Option<u16>,
    pub wind_kmh: Option<f64>,
    pub humidity_pct: Option<u8>,
    pub pressure_hpa: Option<f64>,
    pub rain_mm: Option<f64>,
}

#[async_trait]
pub trait CwopProvider: Send + Sync {
    async fn by_station(&self, station: &str) -> ProviderResult<CwopReport>;
    async fn nearest(&self, lat: f64, lon: f64) -> ProviderResult<CwopReport>;
}

#[async_trait]
pub trait PagerProvider: Send + Sync {
    async fn send(&self, user: &str, text: &str, high_priority: bool) -> ProviderResult<()>;
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Send a position report to an e-mail address.
    async fn send_position(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> ProviderResult<()>;
    /// Prune the Sent folder down to the retention window.
    async fn prune_sent(&self, retention_days: u32) -> ProviderResult<usize>;
}

/// Radiosonde landing prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct SondePrediction {
    pub serial: String,
    pub landing_lat: f64,
    pub landing_lon: f64,
    pub landing_time: DateTime<Utc>,
    pub descending: bool,
}

#[async_trait]
pub trait SondeProvider: Send + Sync {
    async fn predict(&self, serial: &str) -> ProviderResult<SondePrediction>;
}

/// One computed satellite pass over an observer.
#[derive(Debug, Clone, PartialEq)]
pub struct SatPass {
    pub satellite: String,
    /// Acquisition of signal (rise above the elevation threshold).
    pub aos: DateTime<Utc>,
    /// Loss of signal.
    pub los: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub aos_azimuth_deg: f64,
    pub los_azimuth_deg: f64,
    /// Pass happens while the observer is in darkness and the satellite
    /// is sunlit (only computed for visual-pass requests).
    pub visible: bool,
}

#[async_trait]
pub trait PassProvider: Send + Sync {
    /// Next pass at or after `from`, honoring the minimum elevation.
    /// `visual_only` restricts the search to optically visible passes.
    async fn next_pass(
        &self,
        satellite: &str,
        from: DateTime<Utc>,
        lat: f64,
        lon: f64,
        min_elevation_deg: f64,
        visual_only: bool,
    ) -> ProviderResult<SatPass>;
}

/// Active severe-weather warning for a warncell.
#[derive(Debug, Clone, PartialEq)]
pub struct WxWarning {
    pub warncell: String,
    pub headline: String,
    pub onset: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait WarningProvider: Send + Sync {
    async fn active_warnings(&self, warncell: &str) -> ProviderResult<Vec<WxWarning>>;
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

/// Default per-call timeout for provider HTTP requests.
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Build the shared HTTP client used by every provider.
pub fn http_client(agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(agent.to_owned())
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

/// Map a reqwest failure onto the provider taxonomy.
pub(crate) fn transport_err(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

/// Treat non-success statuses as unavailability, except 404 which means
/// the object does not exist.
pub(crate) fn check_status(resp: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound);
    }
    if !status.is_success() {
        return Err(ProviderError::Unavailable(format!("http status {status}")));
    }
    Ok(resp)
}
