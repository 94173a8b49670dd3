//! Task wiring: channels, providers, and the four long-lived tasks.
//!
//! ```text
//! session -> ingress -> (dedup, ack) -> dispatcher -> scheduler -> session
//!                                          ^              ^
//!                                       refdata      beacon/bulletin/
//!                                                    refresh/prune jobs
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ack::AckLedger;
use crate::config::Config;
use crate::dedup::DedupCache;
use crate::dispatch::{Dispatcher, Providers};
use crate::ingress::Ingress;
use crate::providers::{
    aprsfi::AprsFi, aviation::AviationWeather, cwop::FinduCwop, dapnet::Dapnet,
    geocode::Nominatim, mail::SmtpMailer, orbital::Sgp4Passes, severewx::DwdWarnings,
    sonde::SondeHub, wx::OpenWeatherMap, MailProvider,
};
use crate::refdata::RefData;
use crate::scheduler::Scheduler;
use crate::session::{self, SessionConfig};

pub const AGENT: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bring the daemon up and run until ctrl-c.
pub async fn run(cfg: Config) {
    let http = crate::providers::http_client(&format!("{AGENT}/{VERSION}"));
    let refdata = Arc::new(RefData::open(std::path::Path::new(&cfg.data_dir)));
    let ledger = Arc::new(Mutex::new(AckLedger::new()));

    let mail: Option<Arc<dyn MailProvider>> = match &cfg.mail {
        Some(m) => match SmtpMailer::new(&m.smtp_host, &m.smtp_user, &m.smtp_password, &m.imap_host)
        {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                warn!(error = %e, "mail transport unavailable, position mail disabled");
                None
            }
        },
        None => None,
    };

    let dapnet_user = if cfg.dapnet.enabled() {
        cfg.dapnet.user.clone()
    } else {
        String::new()
    };
    let dispatcher = Dispatcher {
        providers: Providers {
            weather: Arc::new(OpenWeatherMap::new(
                http.clone(),
                &cfg.providers.openweathermap_api_key,
            )),
            position: Arc::new(AprsFi::new(http.clone(), &cfg.providers.aprsfi_api_key)),
            geocoder: Arc::new(Nominatim::new(http.clone())),
            aviation: Arc::new(AviationWeather::new(http.clone())),
            cwop: Arc::new(FinduCwop::new(http.clone())),
            pager: Arc::new(Dapnet::new(http.clone(), &dapnet_user, &cfg.dapnet.password)),
            mail: mail.clone(),
            sonde: Arc::new(SondeHub::new(http.clone())),
            passes: Arc::new(Sgp4Passes::new(refdata.clone())),
        },
        refdata: refdata.clone(),
        min_pass_elevation_deg: cfg.providers.min_pass_elevation_deg,
        osm_categories: cfg.providers.osm_categories.clone(),
        default_force_unicode: cfg.force_unicode,
    };

    let ingress = Ingress::new(
        &cfg.station.callsign,
        &cfg.ingress.addressees,
        DedupCache::new(
            Duration::from_secs(cfg.ingress.dedup_ttl_minutes * 60),
            cfg.ingress.dedup_capacity,
        ),
        ledger.clone(),
    );

    let session_cfg = SessionConfig {
        host: cfg.server.host.clone(),
        port: cfg.server.port,
        callsign: cfg.station.callsign.clone(),
        passcode: cfg.station.passcode.clone(),
        filter: cfg.server.filter.clone(),
        agent: AGENT.to_owned(),
        version: VERSION.to_owned(),
        transmit: cfg.station.transmit_enabled(),
        pacing: Duration::from_secs(cfg.schedule.pacing_seconds),
    };
    if !session_cfg.transmit {
        info!("station callsign is the no-call sentinel, running read-only");
    }

    let scheduler = Scheduler {
        warnings: Arc::new(DwdWarnings::new(http.clone())),
        mail,
        refdata,
        http,
        agent: AGENT.to_owned(),
        version: VERSION.to_owned(),
        cfg: cfg.clone(),
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (batch_tx, batch_rx) = mpsc::channel(32);
    let (request_tx, request_rx) = mpsc::channel(32);
    let (session_tx, session_rx) = mpsc::channel(32);

    let callsign = cfg.station.callsign.clone();
    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(session::run(session_cfg, inbound_tx, session_rx));
    tasks.spawn(ingress.run(inbound_rx, batch_tx.clone(), request_tx));
    tasks.spawn(dispatcher.run(callsign, request_rx, batch_tx, ledger));
    tasks.spawn(scheduler.run(batch_rx, session_tx));

    info!(callsign = %cfg.station.callsign, server = %cfg.server.host, "responder up");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, draining");
        }
        Some(_) = tasks.join_next() => {
            warn!("a core task ended unexpectedly, shutting down");
        }
    }
    tasks.shutdown().await;
}
