//! End-to-End Integration Harness: mock APRS-IS server -> full pipeline.
//!
//! The whole request path runs in-process: session, ingress, dispatcher,
//! scheduler, all wired exactly like the daemon, but with scripted
//! providers instead of live HTTP.  The mock server injects inbound
//! frames and records everything the responder transmits.
//!
//! # Coverage
//! - Weather by zip: label, summary and window temperatures in the first
//!   fragment, ack before the first response fragment, fresh outbound ids.
//! - METAR+TAF combined output with the literal `##` separator.
//! - Repeater echo suppression when band/mode filters are supplied.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use responder::ack::AckLedger;
use responder::dedup::DedupCache;
use responder::dispatch::{Dispatcher, Providers};
use responder::ingress::Ingress;
use responder::providers::*;
use responder::refdata::RefData;
use responder::scheduler::Scheduler;
use responder::session::{self, SessionConfig};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Scripted providers
// ---------------------------------------------------------------------------

struct FixedWeather;
#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn forecast(
        &self,
        _lat: f64,
        _lon: f64,
        _metric: bool,
        _lang: &str,
    ) -> ProviderResult<WxForecast> {
        let day = WxDay {
            date: NaiveDate::from_ymd_opt(2021, 1, 16).unwrap(),
            summary: "clear sky".to_owned(),
            temp_morn: -3.2,
            temp_day: -1.4,
            temp_eve: -2.0,
            temp_night: -2.4,
            sunrise: Utc.with_ymd_and_hms(2021, 1, 16, 7, 23, 0).unwrap(),
            sunset: Utc.with_ymd_and_hms(2021, 1, 16, 15, 53, 0).unwrap(),
            clouds_pct: 7,
            uvi: 0.4,
            pressure_hpa: 1021,
            humidity_pct: 86,
            dew_point: -4.0,
            wind_speed: 3.4,
            wind_deg: 251,
        };
        Ok(WxForecast {
            utc_offset_secs: 3600,
            days: vec![day],
            hours: vec![],
        })
    }
}

struct FixedPositions;
#[async_trait]
impl PositionProvider for FixedPositions {
    async fn position(&self, callsign: &str) -> ProviderResult<StationPosition> {
        Ok(StationPosition {
            callsign: callsign.to_uppercase(),
            lat: 50.2,
            lon: 8.6,
            last_heard: Utc.with_ymd_and_hms(2021, 1, 16, 9, 40, 0).unwrap(),
            comment: None,
        })
    }
}

struct FixedGeocoder;
#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn by_city(
        &self,
        _city: &str,
        _state: Option<&str>,
        _country: &str,
    ) -> ProviderResult<GeoPlace> {
        Err(ProviderError::NotFound)
    }

    async fn by_zip(&self, code: &str, _country: &str) -> ProviderResult<GeoPlace> {
        if code == "94043" {
            Ok(GeoPlace {
                lat: 37.42,
                lon: -122.08,
                display_name: "Mountain View, Santa Clara County, California".to_owned(),
            })
        } else {
            Err(ProviderError::NotFound)
        }
    }

    async fn reverse(&self, _lat: f64, _lon: f64) -> ProviderResult<String> {
        Ok("Somewhere 1, 12345 Sometown".to_owned())
    }

    async fn nearby(
        &self,
        _lat: f64,
        _lon: f64,
        _category: &str,
        _limit: usize,
    ) -> ProviderResult<Vec<GeoPlace>> {
        Err(ProviderError::Empty)
    }
}

struct FixedAviation;
#[async_trait]
impl AviationProvider for FixedAviation {
    async fn metar(&self, icao: &str) -> ProviderResult<String> {
        Ok(format!("{icao} 161020Z 25007KT 9999 FEW030 M02/M05 Q1021"))
    }

    async fn taf(&self, icao: &str) -> ProviderResult<String> {
        Ok(format!("TAF {icao} 160900Z 1610/1712 26008KT 9999 SCT035"))
    }
}

struct NoCwop;
#[async_trait]
impl CwopProvider for NoCwop {
    async fn by_station(&self, _station: &str) -> ProviderResult<CwopReport> {
        Err(ProviderError::NotFound)
    }
    async fn nearest(&self, _lat: f64, _lon: f64) -> ProviderResult<CwopReport> {
        Err(ProviderError::Empty)
    }
}

struct NoPager;
#[async_trait]
impl PagerProvider for NoPager {
    async fn send(&self, _user: &str, _text: &str, _high: bool) -> ProviderResult<()> {
        Err(ProviderError::Disabled)
    }
}

struct NoSonde;
#[async_trait]
impl SondeProvider for NoSonde {
    async fn predict(&self, _serial: &str) -> ProviderResult<SondePrediction> {
        Err(ProviderError::NotFound)
    }
}

struct NoPasses;
#[async_trait]
impl PassProvider for NoPasses {
    async fn next_pass(
        &self,
        _satellite: &str,
        _from: chrono::DateTime<Utc>,
        _lat: f64,
        _lon: f64,
        _min_elevation_deg: f64,
        _visual_only: bool,
    ) -> ProviderResult<SatPass> {
        Err(ProviderError::Empty)
    }
}

struct NoWarnings;
#[async_trait]
impl WarningProvider for NoWarnings {
    async fn active_warnings(&self, _warncell: &str) -> ProviderResult<Vec<WxWarning>> {
        Ok(vec![])
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const STATIONS: &str = "\
ED FRANKFURT/MAIN   EDDF  FRA   10637  50 02N  008 34E  111   X     T          7 DE\n";

const REPEATERS: &str = r#"{"relais": [
    {"call": "DB0HRF", "lat": 50.21, "lon": 8.62, "qrg": 438.775,
     "mode": "C4FM", "city": "Feldberg"},
    {"call": "DB0FT", "lat": 50.22, "lon": 8.63, "qrg": 145.6625,
     "mode": "FM", "city": "Feldberg"}
]}"#;

/// Seed the data directory with reference files and fresh stamps so the
/// refresh producer stays idle during the test.
fn seed_data_dir(dir: &std::path::Path) {
    let stamp = format!("{}\n", Utc::now().to_rfc3339());
    std::fs::write(dir.join("stations.txt"), STATIONS).unwrap();
    std::fs::write(dir.join("repeaters.json"), REPEATERS).unwrap();
    std::fs::write(dir.join("amateur.tle"), "").unwrap();
    std::fs::write(dir.join("satfrequencies.csv"), "").unwrap();
    for f in [
        "stations.txt",
        "repeaters.json",
        "amateur.tle",
        "satfrequencies.csv",
    ] {
        std::fs::write(dir.join(format!("{f}.stamp")), &stamp).unwrap();
    }
}

struct Stack {
    server: Arc<ab_test_utils::MockAprsServer>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for Stack {
    fn drop(&mut self) {
        for t in &self.tasks {
            t.abort();
        }
    }
}

/// Bring up the full pipeline against a fresh mock server.
async fn start_stack(data_dir: &std::path::Path) -> Stack {
    seed_data_dir(data_dir);
    let server = ab_test_utils::MockAprsServer::start().await.unwrap();
    let addr = server.local_addr();

    let cfg = responder::config::load_config_from_str(&format!(
        r#"
        [station]
        callsign = "BOT"
        passcode = "12345"
        latitude = "5012.00N"
        longitude = "00836.00E"

        [server]
        host = "{host}"
        port = {port}

        [schedule]
        pacing_seconds = 0
        bulletins = []

        [data]
        directory = "{dir}"
        "#,
        host = addr.ip(),
        port = addr.port(),
        dir = data_dir.display(),
    ))
    .unwrap();

    let refdata = Arc::new(RefData::open(data_dir));
    let ledger = Arc::new(Mutex::new(AckLedger::new()));
    let dispatcher = Dispatcher {
        providers: Providers {
            weather: Arc::new(FixedWeather),
            position: Arc::new(FixedPositions),
            geocoder: Arc::new(FixedGeocoder),
            aviation: Arc::new(FixedAviation),
            cwop: Arc::new(NoCwop),
            pager: Arc::new(NoPager),
            mail: None,
            sonde: Arc::new(NoSonde),
            passes: Arc::new(NoPasses),
        },
        refdata: refdata.clone(),
        min_pass_elevation_deg: 10.0,
        osm_categories: vec!["pub".to_owned()],
        default_force_unicode: false,
    };
    let ingress = Ingress::new(
        "BOT",
        &["BOT".to_owned()],
        DedupCache::new(Duration::from_secs(3600), 64),
        ledger.clone(),
    );
    let scheduler = Scheduler {
        refdata,
        http: responder::providers::http_client("test"),
        warnings: Arc::new(NoWarnings),
        mail: None,
        agent: "aprs-bot".to_owned(),
        version: "0.3.0".to_owned(),
        cfg: cfg.clone(),
    };
    let session_cfg = SessionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        callsign: "BOT".to_owned(),
        passcode: "12345".to_owned(),
        filter: "g/BOT".to_owned(),
        agent: "aprs-bot".to_owned(),
        version: "0.3.0".to_owned(),
        transmit: true,
        pacing: Duration::from_millis(5),
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (batch_tx, batch_rx) = mpsc::channel(32);
    let (request_tx, request_rx) = mpsc::channel(32);
    let (session_tx, session_rx) = mpsc::channel(32);

    let tasks = vec![
        tokio::spawn(session::run(session_cfg, inbound_tx, session_rx)),
        tokio::spawn(ingress.run(inbound_rx, batch_tx.clone(), request_tx)),
        tokio::spawn(dispatcher.run("BOT".to_owned(), request_rx, batch_tx, ledger)),
        tokio::spawn(scheduler.run(batch_rx, session_tx)),
    ];

    server
        .wait_login(Duration::from_secs(2))
        .await
        .expect("session should log in");
    Stack { server, tasks }
}

/// Collect transmitted message payloads (skipping the startup beacon)
/// until the server goes quiet.
async fn collect_messages(stack: &Stack, min: usize) -> Vec<String> {
    let mut lines = Vec::new();
    while lines.len() < min {
        match stack.server.recv_sent(Duration::from_secs(3)).await {
            Some(line) if line.contains(",TCPIP*::") => lines.push(line),
            Some(_) => {}
            None => break,
        }
    }
    lines
}

/// Strip header and trailer from a message line, leaving the payload.
fn payload_of(line: &str) -> String {
    let after = line.split(",TCPIP*::").nth(1).unwrap_or(line);
    let text = after.get(10..).unwrap_or("");
    match text.rfind('{') {
        Some(i) => text[..i].to_owned(),
        None => text.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn weather_by_zip_acks_then_answers() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack(dir.path()).await;

    stack
        .server
        .inject("DF1JSL-8>APRS,qAS::BOT      :94043{ab1");
    // Ack plus three response fragments for the full weather answer.
    let lines = collect_messages(&stack, 4).await;
    assert!(lines.len() >= 2, "expected ack + response, got {lines:?}");

    // Ack precedes the first response fragment.
    assert!(
        lines[0].ends_with(":ackab1"),
        "first outbound must be the ack: {}",
        lines[0]
    );

    let first = payload_of(&lines[1]);
    assert!(
        first.starts_with("16-Jan-21 Mountain View,94043;US clear sky morn:-3c"),
        "unexpected first fragment: {first}"
    );
    assert!(first.contains("day:-1c"), "{first}");
    // The long label pushes the night window into the next fragment; the
    // window token itself must stay whole.
    let joined: String = lines[1..]
        .iter()
        .map(|l| payload_of(l))
        .collect::<Vec<_>>()
        .join(" ");
    assert!(joined.contains("nite:-2c"), "{joined}");

    // Every response fragment respects the ceiling and carries a fresh id.
    let mut seen_ids = std::collections::HashSet::new();
    for line in &lines[1..] {
        let payload = payload_of(line);
        assert!(payload.len() <= ab_protocol::PAYLOAD_MAX, "{payload}");
        let id = line.rsplit('{').next().unwrap();
        assert!(seen_ids.insert(id.to_owned()), "duplicate outbound id {id}");
    }
}

#[tokio::test]
async fn metar_full_combines_metar_and_taf() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack(dir.path()).await;

    // Date/daytime tokens must be ignored for METAR requests.
    stack
        .server
        .inject("DF1JSL-8>APRS,qAS::BOT      :metar full tomorrow{m1");
    // Ack, then the METAR+`##` fragment, then the TAF fragment.
    let lines = collect_messages(&stack, 3).await;
    let full: String = lines[1..]
        .iter()
        .map(|l| payload_of(l))
        .collect::<Vec<_>>()
        .join(" ");
    assert!(full.contains("EDDF 161020Z"), "{full}");
    assert!(full.contains(" ## "), "missing separator: {full}");
    assert!(full.contains("TAF EDDF"), "{full}");
}

#[tokio::test]
async fn repeater_filters_suppress_echo() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack(dir.path()).await;

    stack
        .server
        .inject("DF1JSL-8>APRS,qAS::BOT      :repeater c4fm 70cm{r1");
    let lines = collect_messages(&stack, 2).await;
    let with_filters: String = lines[1..]
        .iter()
        .map(|l| payload_of(l))
        .collect::<Vec<_>>()
        .join(" ");
    assert!(with_filters.contains("DB0HRF"), "{with_filters}");
    assert!(
        !with_filters.contains("c4fm") && !with_filters.contains("70cm"),
        "filters must not be echoed: {with_filters}"
    );

    stack
        .server
        .inject("DF1JSL-8>APRS,qAS::BOT      :repeater{r2");
    let lines = collect_messages(&stack, 2).await;
    let unfiltered: String = lines[1..]
        .iter()
        .map(|l| payload_of(l))
        .collect::<Vec<_>>()
        .join(" ");
    assert!(
        unfiltered.contains("c4fm") || unfiltered.contains("fm"),
        "mode token expected: {unfiltered}"
    );
    assert!(unfiltered.contains("70cm") || unfiltered.contains("2m"), "{unfiltered}");
}

#[tokio::test]
async fn whereis_fields_are_never_torn() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack(dir.path()).await;

    stack
        .server
        .inject("W1AW>APRS,qAS::BOT      :whereis df1jsl-8{w1");
    // Ack plus four fragments of position detail.
    let lines = collect_messages(&stack, 5).await;
    let payloads: Vec<String> = lines[1..].iter().map(|l| payload_of(l)).collect();
    let joined = payloads.join(" | ");

    for marker in ["Grid ", "DMS ", "Dst ", "Brg ", "UTM ", "MGRS ", "LatLon ", "Last heard "] {
        assert!(joined.contains(marker), "missing {marker:?} in {joined}");
    }
    // Key/value atoms stay inside a single fragment.
    for payload in &payloads {
        assert!(payload.len() <= ab_protocol::PAYLOAD_MAX);
        for atom in ["Grid", "Dst", "Brg", "UTM", "MGRS", "LatLon"] {
            if let Some(i) = payload.find(atom) {
                assert!(
                    payload[i..].len() > atom.len() + 1,
                    "{atom} torn at fragment edge: {payload}"
                );
            }
        }
    }
    assert!(joined.contains("Last heard 2021-01-16T09:40:00Z"), "{joined}");
}
