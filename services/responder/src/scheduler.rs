//! Outbound multiplexer and periodic jobs.
//!
//! Single cooperative loop feeding the session.  Inputs:
//! - response/ack batches from the ingress and the dispatcher (each
//!   batch is forwarded contiguously, so fragments of one response never
//!   interleave with another category),
//! - the beacon ticker (every 30 minutes by default),
//! - the bulletin ticker (BLN0..BLN2 in order, every 4 hours),
//! - the severe-weather ticker (hourly, only with a warncell map),
//! - the reference-data refresh ticker (hourly check against the
//!   `.stamp` ages; downloads run on worker tasks, the tick commits),
//! - the mail housekeeping ticker (daily Sent-folder prune).
//!
//! Each job is a typed descriptor with a run-now-then-interval flag, so
//! startup behavior is data, not code paths.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ab_protocol::{OutboundCategory, OutboundFrame};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::providers::{MailProvider, WarningProvider};
use crate::refdata::{self, fetch, RefData};
use crate::response::Response;

/// A periodic duty with its startup behavior.
#[derive(Debug, Clone, Copy)]
pub struct JobSpec {
    pub name: &'static str,
    pub interval: Duration,
    pub run_now: bool,
}

impl JobSpec {
    fn ticker(&self) -> tokio::time::Interval {
        let start = if self.run_now {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.interval
        };
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

/// Which reference file a finished download belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RefreshKind {
    Airports,
    Repeaters,
    Tles,
    Frequencies,
}

impl RefreshKind {
    fn file(&self) -> &'static str {
        match self {
            RefreshKind::Airports => refdata::AIRPORTS_FILE,
            RefreshKind::Repeaters => refdata::REPEATERS_FILE,
            RefreshKind::Tles => refdata::TLE_FILE,
            RefreshKind::Frequencies => refdata::FREQ_FILE,
        }
    }

    fn url(&self) -> &'static str {
        match self {
            RefreshKind::Airports => refdata::AIRPORTS_URL,
            RefreshKind::Repeaters => refdata::REPEATERS_URL,
            RefreshKind::Tles => refdata::TLE_URL,
            RefreshKind::Frequencies => refdata::FREQ_URL,
        }
    }
}

pub struct Scheduler {
    pub cfg: Config,
    pub refdata: Arc<RefData>,
    pub http: reqwest::Client,
    pub warnings: Arc<dyn WarningProvider>,
    pub mail: Option<Arc<dyn MailProvider>>,
    pub agent: String,
    pub version: String,
}

impl Scheduler {
    /// Run until the batch channel closes.
    pub async fn run(
        self,
        mut batch_rx: mpsc::Receiver<Vec<OutboundFrame>>,
        session_tx: mpsc::Sender<OutboundFrame>,
    ) {
        let beacon_spec = JobSpec {
            name: "beacon",
            interval: Duration::from_secs(self.cfg.schedule.beacon_minutes * 60),
            run_now: true,
        };
        let bulletin_spec = JobSpec {
            name: "bulletin",
            interval: Duration::from_secs(self.cfg.schedule.bulletin_hours * 3600),
            run_now: true,
        };
        let severe_spec = JobSpec {
            name: "severe-weather",
            interval: Duration::from_secs(3600),
            run_now: true,
        };
        let refresh_spec = JobSpec {
            name: "refresh-check",
            interval: Duration::from_secs(3600),
            run_now: true,
        };
        let prune_spec = JobSpec {
            name: "mail-prune",
            interval: Duration::from_secs(86_400),
            run_now: true,
        };

        for spec in [beacon_spec, bulletin_spec, severe_spec, refresh_spec, prune_spec] {
            debug!(job = spec.name, interval = ?spec.interval, run_now = spec.run_now, "job armed");
        }
        let mut beacon_tick = beacon_spec.ticker();
        let mut bulletin_tick = bulletin_spec.ticker();
        let mut severe_tick = severe_spec.ticker();
        let mut refresh_tick = refresh_spec.ticker();
        let mut prune_tick = prune_spec.ticker();

        let (done_tx, mut done_rx) = mpsc::channel::<(RefreshKind, bool)>(8);
        let mut in_flight: HashSet<RefreshKind> = HashSet::new();
        let mut broadcast_warnings: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                // Polling order matters at startup: the beacon goes out
                // before the first bulletin cycle.
                biased;
                batch = batch_rx.recv() => {
                    match batch {
                        Some(frames) => {
                            for frame in frames {
                                if session_tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                        }
                        None => {
                            info!("batch channel closed, scheduler shutting down");
                            return;
                        }
                    }
                }
                _ = beacon_tick.tick() => {
                    if self.send_beacon(&session_tx).await.is_err() {
                        return;
                    }
                }
                _ = bulletin_tick.tick() => {
                    if self.send_bulletins(&session_tx).await.is_err() {
                        return;
                    }
                }
                _ = severe_tick.tick(), if !self.cfg.severe_weather.is_empty() => {
                    if self
                        .broadcast_severe_weather(&session_tx, &mut broadcast_warnings)
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                _ = refresh_tick.tick() => {
                    self.spawn_due_refreshes(&mut in_flight, &done_tx);
                }
                Some((kind, ok)) = done_rx.recv() => {
                    in_flight.remove(&kind);
                    if ok {
                        self.commit_refresh(kind);
                    }
                }
                _ = prune_tick.tick(), if self.mail.is_some() => {
                    self.prune_mail().await;
                }
            }
        }
    }

    async fn send_beacon(
        &self,
        session_tx: &mpsc::Sender<OutboundFrame>,
    ) -> Result<(), mpsc::error::SendError<OutboundFrame>> {
        let station = &self.cfg.station;
        let payload = ab_protocol::position::beacon_payload(
            &station.latitude,
            &station.longitude,
            station.symbol_table,
            station.symbol_code,
            &station.alias,
            station.altitude_ft,
            &self.agent,
            &self.version,
        );
        debug!(%payload, "beacon");
        session_tx
            .send(OutboundFrame {
                line: ab_protocol::render_beacon(&station.callsign, &payload),
                category: OutboundCategory::Beacon,
            })
            .await
    }

    async fn send_bulletins(
        &self,
        session_tx: &mpsc::Sender<OutboundFrame>,
    ) -> Result<(), mpsc::error::SendError<OutboundFrame>> {
        for (i, text) in self.cfg.schedule.bulletins.iter().enumerate() {
            session_tx
                .send(OutboundFrame {
                    line: ab_protocol::render_bulletin(&self.cfg.station.callsign, i as u8, text),
                    category: OutboundCategory::Bulletin,
                })
                .await?;
        }
        Ok(())
    }

    async fn broadcast_severe_weather(
        &self,
        session_tx: &mpsc::Sender<OutboundFrame>,
        already_sent: &mut HashSet<String>,
    ) -> Result<(), mpsc::error::SendError<OutboundFrame>> {
        for (warncell, addressee) in &self.cfg.severe_weather {
            let warnings = match self.warnings.active_warnings(warncell).await {
                Ok(w) => w,
                Err(e) => {
                    warn!(warncell, error = %e, "severe weather fetch failed");
                    continue;
                }
            };
            for warning in warnings {
                let key = format!("{warncell}:{}", warning.headline);
                if !already_sent.insert(key) {
                    continue;
                }
                // Headlines are longer than a payload; run them through
                // the standard fragmentation pipeline.
                for payload in
                    crate::fragment::fragment(&Response::plain(&warning.headline), false)
                {
                    session_tx
                        .send(OutboundFrame {
                            line: ab_protocol::render_message(
                                &self.cfg.station.callsign,
                                addressee,
                                &payload,
                                None,
                                None,
                            ),
                            category: OutboundCategory::Bulletin,
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn spawn_due_refreshes(
        &self,
        in_flight: &mut HashSet<RefreshKind>,
        done_tx: &mpsc::Sender<(RefreshKind, bool)>,
    ) {
        let specs = [
            (RefreshKind::Airports, self.cfg.refresh.airports_days),
            (RefreshKind::Repeaters, self.cfg.refresh.repeaters_days),
            (RefreshKind::Tles, self.cfg.refresh.satellites_days),
            (RefreshKind::Frequencies, self.cfg.refresh.satellites_days),
        ];
        for (kind, days) in specs {
            let path = self.refdata.path_of(kind.file());
            if in_flight.contains(&kind)
                || !fetch::is_due(&path, Duration::from_secs(days * 86_400))
            {
                continue;
            }
            in_flight.insert(kind);
            let client = self.http.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                let result = fetch::download_to_temp(&client, kind.url(), &path).await;
                if let Err(e) = &result {
                    warn!(kind = ?kind, error = %e, "reference download failed");
                }
                let _ = done.send((kind, result.is_ok())).await;
            });
        }
    }

    fn commit_refresh(&self, kind: RefreshKind) {
        let path: PathBuf = self.refdata.path_of(kind.file());
        if let Err(e) = fetch::commit(&path) {
            warn!(kind = ?kind, error = %e, "reference commit failed");
            return;
        }
        match kind {
            RefreshKind::Airports => self.refdata.reload_airports(),
            RefreshKind::Repeaters => self.refdata.reload_repeaters(),
            RefreshKind::Tles | RefreshKind::Frequencies => self.refdata.reload_satellites(),
        }
    }

    async fn prune_mail(&self) {
        let Some(mail) = &self.mail else { return };
        let Some(mail_cfg) = &self.cfg.mail else { return };
        match mail.prune_sent(mail_cfg.sent_retention_days).await {
            Ok(count) => info!(count, "sent folder pruned"),
            Err(e) => warn!(error = %e, "sent folder prune failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use crate::providers::{ProviderResult, WxWarning};
    use async_trait::async_trait;

    struct NoWarnings;
    #[async_trait]
    impl WarningProvider for NoWarnings {
        async fn active_warnings(&self, _warncell: &str) -> ProviderResult<Vec<WxWarning>> {
            Ok(vec![])
        }
    }

    /// Fresh stamps for every reference file so the refresh check stays
    /// quiet during tests.
    fn stamp_everything(dir: &std::path::Path) {
        for file in [
            refdata::AIRPORTS_FILE,
            refdata::REPEATERS_FILE,
            refdata::TLE_FILE,
            refdata::FREQ_FILE,
        ] {
            std::fs::write(
                dir.join(format!("{file}.stamp")),
                format!("{}\n", chrono::Utc::now().to_rfc3339()),
            )
            .unwrap();
        }
    }

    fn scheduler(dir: &std::path::Path) -> Scheduler {
        stamp_everything(dir);
        let cfg = load_config_from_str(
            r#"
            [station]
            callsign = "BOT"
            passcode = "12345"
            latitude = "5150.27N"
            longitude = "00819.45E"
            altitude_ft = 680

            [server]
            host = "localhost"

            [schedule]
            bulletins = ["bulletin zero", "bulletin one", "bulletin two"]
            "#,
        )
        .unwrap();
        Scheduler {
            cfg,
            refdata: Arc::new(RefData::open(dir)),
            http: crate::providers::http_client("test"),
            warnings: Arc::new(NoWarnings),
            mail: None,
            agent: "aprs-bot".to_owned(),
            version: "0.3.0".to_owned(),
        }
    }

    #[tokio::test]
    async fn startup_emits_beacon_then_bulletins_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(dir.path());
        let (_batch_tx, batch_rx) = mpsc::channel(8);
        let (session_tx, mut session_rx) = mpsc::channel(32);
        let task = tokio::spawn(sched.run(batch_rx, session_tx));

        let beacon = session_rx.recv().await.unwrap();
        assert_eq!(beacon.category, OutboundCategory::Beacon);
        assert!(beacon.line.contains("=5150.27N/00819.45E"), "{}", beacon.line);
        assert!(beacon.line.contains("/A=000680"), "{}", beacon.line);

        for i in 0..3 {
            let bulletin = session_rx.recv().await.unwrap();
            assert_eq!(bulletin.category, OutboundCategory::Bulletin);
            assert!(
                bulletin.line.contains(&format!("::BLN{i}")),
                "expected BLN{i} in order, got {}",
                bulletin.line
            );
        }
        task.abort();
    }

    #[tokio::test]
    async fn batches_are_forwarded_contiguously() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(dir.path());
        let (batch_tx, batch_rx) = mpsc::channel(8);
        let (session_tx, mut session_rx) = mpsc::channel(32);
        let task = tokio::spawn(sched.run(batch_rx, session_tx));

        // Swallow the startup beacon and bulletins first.
        for _ in 0..4 {
            let _ = session_rx.recv().await.unwrap();
        }

        let batch: Vec<OutboundFrame> = (0..3)
            .map(|i| OutboundFrame {
                line: format!("BOT>APZBOT,TCPIP*::X        :frag{i}"),
                category: OutboundCategory::Message,
            })
            .collect();
        batch_tx.send(batch).await.unwrap();
        for i in 0..3 {
            let frame = session_rx.recv().await.unwrap();
            assert!(frame.line.ends_with(&format!("frag{i}")), "{}", frame.line);
        }
        task.abort();
    }

    #[tokio::test]
    async fn scheduler_stops_when_batch_channel_closes() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(dir.path());
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<OutboundFrame>>(8);
        let (session_tx, mut session_rx) = mpsc::channel(32);
        let task = tokio::spawn(sched.run(batch_rx, session_tx));
        // Drain startup traffic so the loop is idle.
        for _ in 0..4 {
            let _ = session_rx.recv().await;
        }
        drop(batch_tx);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("scheduler should stop")
            .unwrap();
    }
}
