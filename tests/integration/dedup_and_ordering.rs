//! Duplicate suppression and outbound ordering, component-wired.
//!
//! The session is left out here: frames are fed straight into the
//! ingress channel and observed on the scheduler's output, which makes
//! "zero outbound bytes" assertions exact instead of timing-dependent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use responder::ack::AckLedger;
use responder::dedup::DedupCache;
use responder::dispatch::{Dispatcher, Providers};
use responder::ingress::Ingress;
use responder::providers::*;
use responder::refdata::RefData;
use responder::scheduler::Scheduler;
use tokio::sync::mpsc;

struct StubWeather;
#[async_trait]
impl WeatherProvider for StubWeather {
    async fn forecast(
        &self,
        _lat: f64,
        _lon: f64,
        _metric: bool,
        _lang: &str,
    ) -> ProviderResult<WxForecast> {
        Ok(WxForecast {
            utc_offset_secs: 0,
            days: vec![WxDay {
                date: chrono::NaiveDate::from_ymd_opt(2021, 1, 16).unwrap(),
                summary: "overcast".to_owned(),
                temp_morn: 1.0,
                temp_day: 2.0,
                temp_eve: 1.0,
                temp_night: 0.0,
                sunrise: Utc.with_ymd_and_hms(2021, 1, 16, 7, 0, 0).unwrap(),
                sunset: Utc.with_ymd_and_hms(2021, 1, 16, 16, 0, 0).unwrap(),
                clouds_pct: 100,
                uvi: 0.1,
                pressure_hpa: 1013,
                humidity_pct: 90,
                dew_point: -1.0,
                wind_speed: 2.0,
                wind_deg: 180,
            }],
            hours: vec![],
        })
    }
}

struct StubPositions;
#[async_trait]
impl PositionProvider for StubPositions {
    async fn position(&self, callsign: &str) -> ProviderResult<StationPosition> {
        Ok(StationPosition {
            callsign: callsign.to_uppercase(),
            lat: 51.8,
            lon: 9.4,
            last_heard: Utc.with_ymd_and_hms(2021, 1, 16, 9, 0, 0).unwrap(),
            comment: None,
        })
    }
}

struct StubGeocoder;
#[async_trait]
impl Geocoder for StubGeocoder {
    async fn by_city(
        &self,
        _city: &str,
        _state: Option<&str>,
        _country: &str,
    ) -> ProviderResult<GeoPlace> {
        Err(ProviderError::NotFound)
    }
    async fn by_zip(&self, _code: &str, _country: &str) -> ProviderResult<GeoPlace> {
        Ok(GeoPlace {
            lat: 37.42,
            lon: -122.08,
            display_name: "Mountain View".to_owned(),
        })
    }
    async fn reverse(&self, _lat: f64, _lon: f64) -> ProviderResult<String> {
        Err(ProviderError::NotFound)
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

struct Unreachable;
#[async_trait]
impl AviationProvider for Unreachable {
    async fn metar(&self, _icao: &str) -> ProviderResult<String> {
        Err(ProviderError::Unavailable("stub".into()))
    }
    async fn taf(&self, _icao: &str) -> ProviderResult<String> {
        Err(ProviderError::Unavailable("stub".into()))
    }
}
#[async_trait]
impl CwopProvider for Unreachable {
    async fn by_station(&self, _station: &str) -> ProviderResult<CwopReport> {
        Err(ProviderError::Unavailable("stub".into()))
    }
    async fn nearest(&self, _lat: f64, _lon: f64) -> ProviderResult<CwopReport> {
        Err(ProviderError::Unavailable("stub".into()))
    }
}
#[async_trait]
impl PagerProvider for Unreachable {
    async fn send(&self, _user: &str, _text: &str, _high: bool) -> ProviderResult<()> {
        Err(ProviderError::Disabled)
    }
}
#[async_trait]
impl SondeProvider for Unreachable {
    async fn predict(&self, _serial: &str) -> ProviderResult<SondePrediction> {
        Err(ProviderError::NotFound)
    }
}
#[async_trait]
impl PassProvider for Unreachable {
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
#[async_trait]
impl WarningProvider for Unreachable {
    async fn active_warnings(&self, _warncell: &str) -> ProviderResult<Vec<WxWarning>> {
        Ok(vec![])
    }
}

struct Pipeline {
    inbound_tx: mpsc::Sender<ab_protocol::InboundFrame>,
    session_rx: mpsc::Receiver<ab_protocol::OutboundFrame>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        for t in &self.tasks {
            t.abort();
        }
    }
}

fn stamp_everything(dir: &std::path::Path) {
    let stamp = format!("{}\n", Utc::now().to_rfc3339());
    for f in [
        "stations.txt",
        "repeaters.json",
        "amateur.tle",
        "satfrequencies.csv",
    ] {
        std::fs::write(dir.join(format!("{f}.stamp")), &stamp).unwrap();
    }
}

async fn start_pipeline(dir: &std::path::Path, bulletins: &str) -> Pipeline {
    stamp_everything(dir);
    let cfg = responder::config::load_config_from_str(&format!(
        r#"
        [station]
        callsign = "BOT"
        passcode = "12345"
        latitude = "5012.00N"
        longitude = "00836.00E"

        [server]
        host = "unused.example.org"

        [schedule]
        bulletins = {bulletins}

        [data]
        directory = "{dir}"
        "#,
        dir = dir.display(),
    ))
    .unwrap();

    let refdata = Arc::new(RefData::open(dir));
    let ledger = Arc::new(Mutex::new(AckLedger::new()));
    let dispatcher = Dispatcher {
        providers: Providers {
            weather: Arc::new(StubWeather),
            position: Arc::new(StubPositions),
            geocoder: Arc::new(StubGeocoder),
            aviation: Arc::new(Unreachable),
            cwop: Arc::new(Unreachable),
            pager: Arc::new(Unreachable),
            mail: None,
            sonde: Arc::new(Unreachable),
            passes: Arc::new(Unreachable),
        },
        refdata: refdata.clone(),
        min_pass_elevation_deg: 10.0,
        osm_categories: vec![],
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
        warnings: Arc::new(Unreachable),
        mail: None,
        agent: "aprs-bot".to_owned(),
        version: "0.3.0".to_owned(),
        cfg,
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (batch_tx, batch_rx) = mpsc::channel(32);
    let (request_tx, request_rx) = mpsc::channel(32);
    let (session_tx, session_rx) = mpsc::channel(64);

    let tasks = vec![
        tokio::spawn(ingress.run(inbound_rx, batch_tx.clone(), request_tx)),
        tokio::spawn(dispatcher.run("BOT".to_owned(), request_rx, batch_tx, ledger)),
        tokio::spawn(scheduler.run(batch_rx, session_tx)),
    ];
    Pipeline {
        inbound_tx,
        session_rx,
        tasks,
    }
}

fn inbound(line: &str) -> ab_protocol::InboundFrame {
    ab_protocol::parse_line(line).unwrap()
}

async fn recv_within(
    pipeline: &mut Pipeline,
    timeout: Duration,
) -> Option<ab_protocol::OutboundFrame> {
    tokio::time::timeout(timeout, pipeline.session_rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn duplicate_without_id_produces_zero_outbound() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = start_pipeline(dir.path(), "[]").await;

    // Swallow the startup beacon.
    let beacon = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();
    assert_eq!(beacon.category, ab_protocol::OutboundCategory::Beacon);

    pipeline
        .inbound_tx
        .send(inbound("DF1JSL-8>APRS,qAS::BOT      :94043"))
        .await
        .unwrap();
    let mut first_response = Vec::new();
    while let Some(frame) = recv_within(&mut pipeline, Duration::from_millis(800)).await {
        first_response.push(frame);
    }
    assert!(!first_response.is_empty(), "first request must answer");
    // No message-id on the inbound: no ack, and no outbound ids either.
    for frame in &first_response {
        assert_eq!(frame.category, ab_protocol::OutboundCategory::Message);
        assert!(!frame.line.contains("ack"), "{}", frame.line);
        assert!(!frame.line.contains('{'), "{}", frame.line);
    }

    // The identical body again, inside the TTL: nothing at all may leave.
    pipeline
        .inbound_tx
        .send(inbound("DF1JSL-8>APRS,qAS::BOT      :94043"))
        .await
        .unwrap();
    assert!(
        recv_within(&mut pipeline, Duration::from_millis(800)).await.is_none(),
        "duplicate produced outbound traffic"
    );
}

#[tokio::test]
async fn duplicate_with_fresh_id_is_answered_again() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = start_pipeline(dir.path(), "[]").await;
    let _beacon = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();

    for id in ["a1", "a2"] {
        pipeline
            .inbound_tx
            .send(inbound(&format!("DF1JSL-8>APRS,qAS::BOT      :94043{{{id}")))
            .await
            .unwrap();
        let ack = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();
        assert_eq!(ack.category, ab_protocol::OutboundCategory::Ack);
        assert!(ack.line.ends_with(&format!(":ack{id}")), "{}", ack.line);
        // Drain that request's response before the next round.
        while let Some(frame) = recv_within(&mut pipeline, Duration::from_millis(500)).await {
            assert_eq!(frame.category, ab_protocol::OutboundCategory::Message);
        }
    }
}

#[tokio::test]
async fn bulletins_follow_beacon_in_strict_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = start_pipeline(
        dir.path(),
        r#"["APRS bot on duty", "send 'help' for usage", "73"]"#,
    )
    .await;

    let beacon = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();
    assert_eq!(beacon.category, ab_protocol::OutboundCategory::Beacon);
    for i in 0..3u8 {
        let bulletin = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();
        assert_eq!(bulletin.category, ab_protocol::OutboundCategory::Bulletin);
        assert!(
            bulletin.line.contains(&format!("::BLN{i}")),
            "BLN{i} expected next, got {}",
            bulletin.line
        );
    }
}

#[tokio::test]
async fn ack_always_precedes_response_fragments() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = start_pipeline(dir.path(), "[]").await;
    let _beacon = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();

    pipeline
        .inbound_tx
        .send(inbound("DF1JSL-8>APRS,qAS::BOT      :wx{zz9"))
        .await
        .unwrap();
    let first = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();
    assert_eq!(first.category, ab_protocol::OutboundCategory::Ack);
    let second = recv_within(&mut pipeline, Duration::from_secs(2)).await.unwrap();
    assert_eq!(second.category, ab_protocol::OutboundCategory::Message);
    assert!(second.line.contains('{'), "response must carry a fresh id");
}
