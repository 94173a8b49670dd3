//! Responder configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/aprs-bot/responder.toml`.
//!
//! # Required fields
//! - `station.callsign`, `station.passcode`
//! - `station.latitude` / `station.longitude` (fixed-width APRS form)
//! - `server.host`
//! - `mail.sent_retention_days` whenever a mail account is configured
//!
//! # Sentinels
//! - `station.callsign = "N0CALL"` keeps the daemon read-only: frames are
//!   logged instead of written to the socket.
//! - `dapnet.user = "n0call"` disables the pager gateway.
//! - an empty `mail.smtp_host` disables position mail.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config types (validated)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub station: StationConfig,
    pub server: ServerConfig,
    pub ingress: IngressConfig,
    pub schedule: ScheduleConfig,
    pub refresh: RefreshConfig,
    pub providers: ProvidersConfig,
    pub dapnet: DapnetConfig,
    pub mail: Option<MailConfig>,
    pub force_unicode: bool,
    pub data_dir: String,
    /// Warncell id -> bulletin addressee for severe-weather broadcasts.
    pub severe_weather: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub callsign: String,
    pub passcode: String,
    pub alias: String,
    /// Fixed-width APRS latitude, e.g. `5150.27N`.
    pub latitude: String,
    /// Fixed-width APRS longitude, e.g. `00819.45E`.
    pub longitude: String,
    pub symbol_table: char,
    pub symbol_code: char,
    pub altitude_ft: u32,
}

impl StationConfig {
    /// Read-only sentinel: with no real callsign the session never writes.
    pub fn transmit_enabled(&self) -> bool {
        !is_nocall(&self.callsign)
    }

    pub fn latitude_deg(&self) -> f64 {
        ab_protocol::position::decode_latitude(&self.latitude).unwrap_or(0.0)
    }

    pub fn longitude_deg(&self) -> f64 {
        ab_protocol::position::decode_longitude(&self.longitude).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub filter: String,
}

#[derive(Debug, Clone)]
pub struct IngressConfig {
    /// Secondary addressee filter (exact-match set).
    pub addressees: Vec<String>,
    pub dedup_ttl_minutes: u64,
    pub dedup_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub beacon_minutes: u64,
    pub bulletin_hours: u64,
    /// Up to three lines, emitted as BLN0..BLN2 in order.
    pub bulletins: Vec<String>,
    pub pacing_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub satellites_days: u64,
    pub repeaters_days: u64,
    pub airports_days: u64,
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub openweathermap_api_key: String,
    pub aprsfi_api_key: String,
    pub min_pass_elevation_deg: f64,
    /// Bare-token OSM category allow-list (lowercase).
    pub osm_categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DapnetConfig {
    pub user: String,
    pub password: String,
}

impl DapnetConfig {
    pub fn enabled(&self) -> bool {
        !is_nocall(&self.user)
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_user: String,
    pub smtp_password: String,
    pub imap_host: String,
    /// Mandatory; the Sent prune is destructive so there is no default.
    pub sent_retention_days: u32,
}

fn is_nocall(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case("n0call") || v.eq_ignore_ascii_case("no-call")
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    station: Option<RawStation>,
    server: Option<RawServer>,
    ingress: Option<RawIngress>,
    schedule: Option<RawSchedule>,
    refresh: Option<RawRefresh>,
    providers: Option<RawProviders>,
    dapnet: Option<RawDapnet>,
    mail: Option<RawMail>,
    output: Option<RawOutput>,
    data: Option<RawData>,
    severe_weather: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    callsign: Option<String>,
    passcode: Option<String>,
    alias: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    symbol_table: Option<String>,
    symbol_code: Option<String>,
    altitude_ft: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIngress {
    addressees: Option<Vec<String>>,
    dedup_ttl_minutes: Option<u64>,
    dedup_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawSchedule {
    beacon_minutes: Option<u64>,
    bulletin_hours: Option<u64>,
    bulletins: Option<Vec<String>>,
    pacing_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRefresh {
    satellites_days: Option<u64>,
    repeaters_days: Option<u64>,
    airports_days: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawProviders {
    openweathermap_api_key: Option<String>,
    aprsfi_api_key: Option<String>,
    min_pass_elevation_deg: Option<f64>,
    osm_categories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawDapnet {
    user: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMail {
    smtp_host: Option<String>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    imap_host: Option<String>,
    sent_retention_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    force_unicode: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    directory: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load config from the default path `/etc/aprs-bot/responder.toml`.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from_path(Path::new("/etc/aprs-bot/responder.toml"))
}

/// Load config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    // Station: callsign, passcode and coordinates are required.
    let raw_station = raw
        .station
        .ok_or_else(|| ConfigError::MissingField("station".to_owned()))?;
    let callsign = raw_station
        .callsign
        .ok_or_else(|| ConfigError::MissingField("station.callsign".to_owned()))?
        .to_uppercase();
    let passcode = raw_station
        .passcode
        .ok_or_else(|| ConfigError::MissingField("station.passcode".to_owned()))?;
    let latitude = raw_station
        .latitude
        .ok_or_else(|| ConfigError::MissingField("station.latitude".to_owned()))?;
    let longitude = raw_station
        .longitude
        .ok_or_else(|| ConfigError::MissingField("station.longitude".to_owned()))?;
    ab_protocol::position::decode_latitude(&latitude)
        .map_err(|e| ConfigError::InvalidValue(format!("station.latitude: {}", e)))?;
    ab_protocol::position::decode_longitude(&longitude)
        .map_err(|e| ConfigError::InvalidValue(format!("station.longitude: {}", e)))?;
    let station = StationConfig {
        alias: raw_station.alias.unwrap_or_else(|| callsign.clone()),
        symbol_table: single_char(raw_station.symbol_table.as_deref(), '/', "station.symbol_table")?,
        symbol_code: single_char(raw_station.symbol_code.as_deref(), '#', "station.symbol_code")?,
        altitude_ft: raw_station.altitude_ft.unwrap_or(0),
        callsign,
        passcode,
        latitude,
        longitude,
    };

    // Server.
    let raw_server = raw
        .server
        .ok_or_else(|| ConfigError::MissingField("server".to_owned()))?;
    let host = raw_server
        .host
        .ok_or_else(|| ConfigError::MissingField("server.host".to_owned()))?;
    let server = ServerConfig {
        host,
        port: raw_server.port.unwrap_or(14580),
        filter: raw_server
            .filter
            .unwrap_or_else(|| format!("g/{0}/{0}-*", station.callsign)),
    };

    // Ingress defaults.
    let ingress = match raw.ingress {
        Some(i) => IngressConfig {
            addressees: normalize_addressees(
                i.addressees
                    .unwrap_or_else(|| vec![station.callsign.clone()]),
            ),
            dedup_ttl_minutes: i.dedup_ttl_minutes.unwrap_or(60),
            dedup_capacity: i.dedup_capacity.unwrap_or(2160),
        },
        None => IngressConfig {
            addressees: vec![station.callsign.clone()],
            dedup_ttl_minutes: 60,
            dedup_capacity: 2160,
        },
    };
    if ingress.addressees.is_empty() {
        return Err(ConfigError::InvalidValue(
            "ingress.addressees must not be empty".to_owned(),
        ));
    }

    // Schedule defaults.
    let schedule = match raw.schedule {
        Some(s) => {
            let bulletins = s.bulletins.unwrap_or_default();
            if bulletins.len() > 3 {
                return Err(ConfigError::InvalidValue(
                    "schedule.bulletins supports at most three lines (BLN0..BLN2)".to_owned(),
                ));
            }
            ScheduleConfig {
                beacon_minutes: s.beacon_minutes.unwrap_or(30),
                bulletin_hours: s.bulletin_hours.unwrap_or(4),
                bulletins,
                pacing_seconds: s.pacing_seconds.unwrap_or(6),
            }
        }
        None => ScheduleConfig {
            beacon_minutes: 30,
            bulletin_hours: 4,
            bulletins: Vec::new(),
            pacing_seconds: 6,
        },
    };

    // Refresh defaults.
    let refresh = match raw.refresh {
        Some(r) => RefreshConfig {
            satellites_days: r.satellites_days.unwrap_or(2),
            repeaters_days: r.repeaters_days.unwrap_or(7),
            airports_days: r.airports_days.unwrap_or(30),
        },
        None => RefreshConfig {
            satellites_days: 2,
            repeaters_days: 7,
            airports_days: 30,
        },
    };

    // Providers.
    let providers = match raw.providers {
        Some(p) => ProvidersConfig {
            openweathermap_api_key: p.openweathermap_api_key.unwrap_or_default(),
            aprsfi_api_key: p.aprsfi_api_key.unwrap_or_default(),
            min_pass_elevation_deg: p.min_pass_elevation_deg.unwrap_or(10.0),
            osm_categories: p
                .osm_categories
                .map(|c| c.into_iter().map(|s| s.to_lowercase()).collect())
                .unwrap_or_else(default_osm_categories),
        },
        None => ProvidersConfig {
            openweathermap_api_key: String::new(),
            aprsfi_api_key: String::new(),
            min_pass_elevation_deg: 10.0,
            osm_categories: default_osm_categories(),
        },
    };

    // DAPNET (sentinel user disables).
    let dapnet = match raw.dapnet {
        Some(d) => DapnetConfig {
            user: d.user.unwrap_or_else(|| "n0call".to_owned()),
            password: d.password.unwrap_or_default(),
        },
        None => DapnetConfig {
            user: "n0call".to_owned(),
            password: String::new(),
        },
    };

    // Mail: optional, but once configured the Sent retention is mandatory.
    let mail = match raw.mail {
        Some(m) => {
            let smtp_host = m.smtp_host.unwrap_or_default();
            if smtp_host.is_empty() {
                None
            } else {
                let sent_retention_days = m.sent_retention_days.ok_or_else(|| {
                    ConfigError::MissingField("mail.sent_retention_days".to_owned())
                })?;
                if sent_retention_days == 0 {
                    return Err(ConfigError::InvalidValue(
                        "mail.sent_retention_days must be at least 1".to_owned(),
                    ));
                }
                Some(MailConfig {
                    smtp_host,
                    smtp_user: m.smtp_user.unwrap_or_default(),
                    smtp_password: m.smtp_password.unwrap_or_default(),
                    imap_host: m.imap_host.unwrap_or_default(),
                    sent_retention_days,
                })
            }
        }
        None => None,
    };

    Ok(Config {
        station,
        server,
        ingress,
        schedule,
        refresh,
        providers,
        dapnet,
        mail,
        force_unicode: raw.output.and_then(|o| o.force_unicode).unwrap_or(false),
        data_dir: raw
            .data
            .and_then(|d| d.directory)
            .unwrap_or_else(|| "/var/lib/aprs-bot".to_owned()),
        severe_weather: raw.severe_weather.unwrap_or_default(),
    })
}

fn normalize_addressees(list: Vec<String>) -> Vec<String> {
    list.into_iter().map(|a| a.trim().to_uppercase()).collect()
}

fn single_char(value: Option<&str>, default: char, field: &str) -> Result<char, ConfigError> {
    match value {
        None => Ok(default),
        Some(s) if s.chars().count() == 1 => Ok(s.chars().next().unwrap()),
        Some(s) => Err(ConfigError::InvalidValue(format!(
            "{field} must be a single character, got {s:?}"
        ))),
    }
}

fn default_osm_categories() -> Vec<String> {
    [
        "atm", "bakery", "bank", "butcher", "cafe", "drugstore", "fuel", "hospital", "hotel",
        "pharmacy", "police", "post_office", "pub", "restaurant", "supermarket",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
