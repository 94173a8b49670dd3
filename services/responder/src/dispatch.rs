//! Action dispatch: one provider orchestration per parsed command.
//!
//! The dispatcher is the only place that turns a symbolic target into a
//! concrete coordinate (geocoding, position lookup, or the sender's own
//! last-known position) and the only place that maps provider failures
//! onto user-visible text.  Provider calls that report unavailability are
//! retried once; everything else surfaces directly.
//!
//! Per-action date semantics: weather projects the date/daytime window
//! using the provider-reported UTC offset; satellite passes use the
//! window as the search start instant; METAR/TAF/CWOP discard any
//! supplied date or daytime.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::command::{Action, Command, DateOffset, Daytime, Target, Units};
use crate::fragment::{self, MessageIdGen};
use crate::ingress::Request;
use crate::parser::{self, ParserContext};
use crate::providers::*;
use crate::refdata::RefData;
use crate::response::{Line, Response};

pub struct Providers {
    pub weather: Arc<dyn WeatherProvider>,
    pub position: Arc<dyn PositionProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub aviation: Arc<dyn AviationProvider>,
    pub cwop: Arc<dyn CwopProvider>,
    pub pager: Arc<dyn PagerProvider>,
    pub mail: Option<Arc<dyn MailProvider>>,
    pub sonde: Arc<dyn SondeProvider>,
    pub passes: Arc<dyn PassProvider>,
}

pub struct Dispatcher {
    pub providers: Providers,
    pub refdata: Arc<RefData>,
    pub min_pass_elevation_deg: f64,
    pub osm_categories: Vec<String>,
    pub default_force_unicode: bool,
}

/// A coordinate with the label the formatters print for it.
#[derive(Debug, Clone)]
struct Resolved {
    lat: f64,
    lon: f64,
    label: String,
}

impl Dispatcher {
    /// FIFO worker: parse, dispatch, fragment, hand the rendered batch to
    /// the scheduler.  One request at a time by design.
    pub async fn run(
        self,
        callsign: String,
        mut request_rx: tokio::sync::mpsc::Receiver<Request>,
        batch_tx: tokio::sync::mpsc::Sender<Vec<ab_protocol::OutboundFrame>>,
        ledger: std::sync::Arc<std::sync::Mutex<crate::ack::AckLedger>>,
    ) {
        let id_gen = MessageIdGen::new();
        while let Some(request) = request_rx.recv().await {
            let satellites = self.refdata.satellite_names();
            let icao = self.refdata.icao_codes();
            let iata = self.refdata.iata_codes();
            let ctx = ParserContext {
                sender: &request.source,
                now: Utc::now(),
                default_force_unicode: self.default_force_unicode,
                satellite_names: &satellites,
                icao_codes: &icao,
                iata_codes: &iata,
                osm_categories: &self.osm_categories,
            };
            let cmd = parser::parse(&request.body, request.message_id.clone(), &ctx);
            info!(from = %request.source, action = ?cmd.action, "dispatching");

            let response = self.dispatch(&cmd, &request.source, Utc::now()).await;
            let payloads = fragment::fragment(&response, cmd.force_unicode);
            let mut frames = Vec::with_capacity(payloads.len());
            for (i, payload) in payloads.iter().enumerate() {
                let message_id = cmd.message_id.as_ref().map(|_| id_gen.next_id());
                if let Some(id) = &message_id {
                    ledger.lock().unwrap().sent(id, &request.source);
                }
                // Reply-ack senders get the original id acked in-band on
                // the first fragment.
                let reply_ack = match (&cmd.message_id, request.uses_reply_ack, i) {
                    (Some(orig), true, 0) => Some(orig.clone()),
                    _ => None,
                };
                frames.push(ab_protocol::OutboundFrame {
                    line: ab_protocol::render_message(
                        &callsign,
                        &request.source,
                        payload,
                        message_id.as_deref(),
                        reply_ack.as_deref(),
                    ),
                    category: ab_protocol::OutboundCategory::Message,
                });
            }
            if batch_tx.send(frames).await.is_err() {
                return;
            }
        }
    }

    /// Produce the semantic response for one command.  Infallible: every
    /// provider failure becomes canned text.
    pub async fn dispatch(&self, cmd: &Command, sender: &str, now: DateTime<Utc>) -> Response {
        match self.try_dispatch(cmd, sender, now).await {
            Ok(response) => response,
            Err(e) => {
                warn!(action = ?cmd.action, error = %e, "dispatch failed");
                Response::plain(error_text(&e))
            }
        }
    }

    async fn try_dispatch(
        &self,
        cmd: &Command,
        sender: &str,
        now: DateTime<Utc>,
    ) -> ProviderResult<Response> {
        match cmd.action {
            Action::Wx => self.wx(cmd, sender).await,
            Action::Metar | Action::Taf | Action::MetarTafFull => self.metar_taf(cmd, sender).await,
            Action::Cwop => self.cwop(cmd, sender).await,
            Action::WhereIs | Action::WhereAmI => self.whereis(cmd, sender).await,
            Action::RiseSet => self.riseset(cmd, sender, now).await,
            Action::SatPass | Action::VisPass => self.satpass(cmd, sender, now).await,
            Action::SatFreq => self.satfreq(cmd),
            Action::Repeater => self.repeater(cmd, sender).await,
            Action::OsmCategory => self.osm(cmd, sender).await,
            Action::Dapnet | Action::DapnetHighPri => self.dapnet(cmd).await,
            Action::PosMsg => self.posmsg(cmd, sender).await,
            Action::Sonde => self.sonde(cmd, sender).await,
            Action::Fortune => Ok(Response::plain(fortune::tell())),
            Action::Help => Ok(Response::plain(
                "commands: wx metar taf cwop whereis whereami riseset satpass \
                 satfreq repeater osm dapnet posmsg sonde - modifiers: date, \
                 morn/day/eve/nite, metric/imperial, lang xx, top2..5",
            )),
            Action::Unknown => Ok(Response::plain(
                "sorry, did not understand your request - send 'help' for usage",
            )),
        }
    }

    // -- coordinate resolution ------------------------------------------------

    async fn resolve(&self, target: &Target, sender: &str) -> ProviderResult<Resolved> {
        match target {
            Target::UserPosition | Target::Cwop(_) | Target::RepeaterFilter { .. } => {
                let pos = retry_once(|| self.providers.position.position(sender)).await?;
                Ok(Resolved {
                    lat: pos.lat,
                    lon: pos.lon,
                    label: pos.callsign,
                })
            }
            Target::OtherCallsign(call) => {
                let pos = retry_once(|| self.providers.position.position(call)).await?;
                Ok(Resolved {
                    lat: pos.lat,
                    lon: pos.lon,
                    label: pos.callsign,
                })
            }
            Target::LatLon(lat, lon) => Ok(Resolved {
                lat: *lat,
                lon: *lon,
                label: format!("{lat:.4}/{lon:.4}"),
            }),
            Target::Grid(grid) => {
                let (lat, lon) =
                    ab_geo::grid_to_latlon(grid).map_err(|_| ProviderError::NotFound)?;
                Ok(Resolved {
                    lat,
                    lon,
                    label: grid.to_uppercase(),
                })
            }
            Target::Zip { code, country } => {
                let country = country.as_deref().unwrap_or("US");
                let place = retry_once(|| self.providers.geocoder.by_zip(code, country)).await?;
                Ok(Resolved {
                    lat: place.lat,
                    lon: place.lon,
                    label: format!(
                        "{},{code};{country}",
                        first_component(&place.display_name)
                    ),
                })
            }
            Target::CityCountry {
                city,
                state,
                country,
            } => {
                let place = retry_once(|| {
                    self.providers
                        .geocoder
                        .by_city(city, state.as_deref(), country)
                })
                .await?;
                Ok(Resolved {
                    lat: place.lat,
                    lon: place.lon,
                    label: format!("{};{country}", title_case(city)),
                })
            }
            Target::Icao(code) => {
                let airport = self
                    .refdata
                    .airport_by_icao(code)
                    .ok_or(ProviderError::NotFound)?;
                Ok(Resolved {
                    lat: airport.lat,
                    lon: airport.lon,
                    label: airport.icao,
                })
            }
            Target::Iata(code) => {
                let airport = self
                    .refdata
                    .airport_by_iata(code)
                    .ok_or(ProviderError::NotFound)?;
                Ok(Resolved {
                    lat: airport.lat,
                    lon: airport.lon,
                    label: airport.icao,
                })
            }
            Target::Satellite(_)
            | Target::OsmPhrase(_)
            | Target::Email(_)
            | Target::DapnetUser { .. } => {
                // These targets are not coordinates; the observer is the
                // sender's own position.
                let pos = retry_once(|| self.providers.position.position(sender)).await?;
                Ok(Resolved {
                    lat: pos.lat,
                    lon: pos.lon,
                    label: pos.callsign,
                })
            }
        }
    }

    // -- per-action formatters ------------------------------------------------

    async fn wx(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        let place = self.resolve(&cmd.target, sender).await?;
        let metric = cmd.units == Units::Metric;
        let forecast = retry_once(|| {
            self.providers
                .weather
                .forecast(place.lat, place.lon, metric, &cmd.language)
        })
        .await?;
        let deg = if metric { "c" } else { "f" };
        let speed = if metric { "m/s" } else { "mph" };

        let mut response = Response::new();
        match cmd.date_offset {
            DateOffset::Hours(n) => {
                let hour = forecast
                    .hours
                    .get(usize::from(n))
                    .ok_or(ProviderError::Empty)?;
                let local = hour.time + Duration::seconds(i64::from(forecast.utc_offset_secs));
                response.push(
                    Line::new()
                        .atom(local.format("%d-%b-%y %H:%M").to_string())
                        .atom(place.label.clone())
                        .text(hour.summary.clone())
                        .atom(format!("temp:{:.0}{deg}", hour.temp)),
                );
            }
            DateOffset::Today | DateOffset::Days(_) => {
                let index = match cmd.date_offset {
                    DateOffset::Days(n) => usize::from(n),
                    _ => 0,
                };
                let day = forecast.days.get(index).ok_or(ProviderError::Empty)?;
                let mut line = Line::new()
                    .atom(day.date.format("%d-%b-%y").to_string())
                    .atom(place.label.clone())
                    .text(day.summary.clone());
                line = match cmd.daytime {
                    Daytime::Full => line
                        .atom(format!("morn:{:.0}{deg}", day.temp_morn))
                        .atom(format!("day:{:.0}{deg}", day.temp_day))
                        .atom(format!("eve:{:.0}{deg}", day.temp_eve))
                        .atom(format!("nite:{:.0}{deg}", day.temp_night)),
                    Daytime::Morning => line.atom(format!("morn:{:.0}{deg}", day.temp_morn)),
                    Daytime::Day => line.atom(format!("day:{:.0}{deg}", day.temp_day)),
                    Daytime::Evening => line.atom(format!("eve:{:.0}{deg}", day.temp_eve)),
                    Daytime::Night => line.atom(format!("nite:{:.0}{deg}", day.temp_night)),
                };
                response.push(line);
                let offset = Duration::seconds(i64::from(forecast.utc_offset_secs));
                response.push(
                    Line::new()
                        .atom(format!(
                            "sunrise/set {}/{}",
                            (day.sunrise + offset).format("%H:%M"),
                            (day.sunset + offset).format("%H:%M")
                        ))
                        .atom(format!("clouds:{}%", day.clouds_pct))
                        .atom(format!("uvi:{:.1}", day.uvi))
                        .atom(format!("{}hPa", day.pressure_hpa))
                        .atom(format!("hum:{}%", day.humidity_pct))
                        .atom(format!("dewpt:{:.0}{deg}", day.dew_point))
                        .atom(format!("wndspd:{:.1}{speed}", day.wind_speed))
                        .atom(format!("wnddeg:{}", day.wind_deg)),
                );
            }
        }
        Ok(response)
    }

    async fn metar_taf(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        // Date and daytime are discarded here by contract.
        let icao = match &cmd.target {
            Target::Icao(code) => code.clone(),
            Target::Iata(code) => {
                self.refdata
                    .airport_by_iata(code)
                    .ok_or(ProviderError::NotFound)?
                    .icao
            }
            other => {
                let place = self.resolve(other, sender).await?;
                self.refdata
                    .nearest_airport(place.lat, place.lon)
                    .ok_or(ProviderError::NotFound)?
                    .icao
            }
        };
        let mut response = Response::new();
        match cmd.action {
            Action::Taf => {
                let taf = retry_once(|| self.providers.aviation.taf(&icao)).await?;
                response.push(Line::new().text(taf));
            }
            Action::MetarTafFull => {
                let metar = retry_once(|| self.providers.aviation.metar(&icao)).await?;
                let taf = retry_once(|| self.providers.aviation.taf(&icao)).await?;
                response.push(Line::new().text(metar).atom("##").text(taf));
            }
            _ => {
                let metar = retry_once(|| self.providers.aviation.metar(&icao)).await?;
                response.push(Line::new().text(metar));
            }
        }
        Ok(response)
    }

    async fn cwop(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        let report = match &cmd.target {
            Target::Cwop(Some(station)) => {
                retry_once(|| self.providers.cwop.by_station(station)).await?
            }
            _ => {
                let place = self.resolve(&cmd.target, sender).await?;
                retry_once(|| self.providers.cwop.nearest(place.lat, place.lon)).await?
            }
        };
        let metric = cmd.units == Units::Metric;
        let mut line = Line::new().atom(report.station.clone());
        if let Some(t) = report.temp_c {
            let (value, letter) = if metric {
                (t, 'c')
            } else {
                (t * 9.0 / 5.0 + 32.0, 'f')
            };
            line = line.atom(format!("{value:.0}{letter}"));
        }
        if let Some(deg) = report.wind_deg {
            line = line.atom(format!("wnddeg:{deg}"));
        }
        if let Some(kmh) = report.wind_kmh {
            let (value, unit) = if metric {
                (kmh, "km/h")
            } else {
                (kmh / 1.609_344, "mph")
            };
            line = line.atom(format!("wndspd:{value:.0}{unit}"));
        }
        if let Some(h) = report.humidity_pct {
            line = line.atom(format!("hum:{h}%"));
        }
        if let Some(p) = report.pressure_hpa {
            line = line.atom(format!("{p:.0}hPa"));
        }
        if let Some(r) = report.rain_mm {
            line = line.atom(format!("rain:{r:.1}mm"));
        }
        let mut response = Response::new();
        response.push(line);
        Ok(response)
    }

    async fn whereis(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        let call = match &cmd.target {
            Target::OtherCallsign(c) => c.as_str(),
            _ => sender,
        };
        let target = retry_once(|| self.providers.position.position(call)).await?;
        let metric = cmd.units == Units::Metric;

        let mut response = Response::new();
        let mut line = Line::new()
            .atom(format!("{}:", target.callsign))
            .atom(format!(
                "Grid {}",
                ab_geo::latlon_to_grid(target.lat, target.lon)
            ))
            .atom(format!("DMS {}", ab_geo::format_dms(target.lat, target.lon)));

        // Distance and bearing only make sense relative to somewhere else:
        // the sender's own position, when the target is a third party.
        if cmd.action == Action::WhereIs && !sender.eq_ignore_ascii_case(call) {
            if let Ok(own) = retry_once(|| self.providers.position.position(sender)).await {
                let km = ab_geo::distance_km(own.lat, own.lon, target.lat, target.lon);
                let (value, unit) = if metric { (km, "km") } else { (km / 1.609_344, "mi") };
                let brg = ab_geo::bearing_deg(own.lat, own.lon, target.lat, target.lon);
                line = line
                    .atom(format!("Dst {value:.0} {unit}"))
                    .atom(format!("Brg {brg:.0} deg ({})", ab_geo::compass_point(brg)));
            }
        }

        if let Ok(utm) = ab_geo::to_utm(target.lat, target.lon) {
            line = line.atom(format!("UTM {utm}"));
        }
        if let Ok(mgrs) = ab_geo::to_mgrs(target.lat, target.lon) {
            line = line.atom(format!("MGRS {mgrs}"));
        }
        line = line.atom(format!("LatLon {:.4}/{:.4}", target.lat, target.lon));
        response.push(line);

        if let Ok(address) = retry_once(|| self.providers.geocoder.reverse(target.lat, target.lon))
            .await
        {
            response.push(Line::new().text(address));
        }
        response.push(Line::new().atom(format!(
            "Last heard {}",
            target.last_heard.format("%Y-%m-%dT%H:%M:%SZ")
        )));
        Ok(response)
    }

    async fn riseset(
        &self,
        cmd: &Command,
        sender: &str,
        now: DateTime<Utc>,
    ) -> ProviderResult<Response> {
        let place = self.resolve(&cmd.target, sender).await?;
        let date = match cmd.date_offset {
            DateOffset::Days(n) => (now + Duration::days(i64::from(n))).date_naive(),
            DateOffset::Hours(n) => (now + Duration::hours(i64::from(n))).date_naive(),
            DateOffset::Today => now.date_naive(),
        };
        let mut response = Response::new();
        let prefix = Line::new()
            .atom(date.format("%d-%b-%y").to_string())
            .atom(place.label.clone());
        match celestial::sun_times(place.lat, place.lon, date) {
            celestial::SunEvent::RiseSet { rise, transit, set } => {
                response.push(
                    prefix
                        .atom(format!("sunrise {}Z", rise.format("%H:%M")))
                        .atom(format!("transit {}Z", transit.format("%H:%M")))
                        .atom(format!("sunset {}Z", set.format("%H:%M"))),
                );
            }
            celestial::SunEvent::AlwaysUp => {
                response.push(prefix.atom("sun up all day (polar day)"));
            }
            celestial::SunEvent::AlwaysDown => {
                response.push(prefix.atom("sun down all day (polar night)"));
            }
        }
        Ok(response)
    }

    async fn satpass(
        &self,
        cmd: &Command,
        sender: &str,
        now: DateTime<Utc>,
    ) -> ProviderResult<Response> {
        let Target::Satellite(name) = &cmd.target else {
            return Err(ProviderError::NotFound);
        };
        let observer = self.resolve(&Target::UserPosition, sender).await?;
        // The date/daytime window is the search start, not a filter.
        let from = search_start(cmd, now);
        let visual_only = cmd.action == Action::VisPass;
        let pass = retry_once(|| {
            self.providers.passes.next_pass(
                name,
                from,
                observer.lat,
                observer.lon,
                self.min_pass_elevation_deg,
                visual_only,
            )
        })
        .await?;
        let mut response = Response::new();
        let mut line = Line::new()
            .atom(name.to_uppercase())
            .atom(format!("AOS {}Z", pass.aos.format("%d-%b %H:%M")))
            .atom(format!("az {:.0}", pass.aos_azimuth_deg))
            .atom(format!("maxEl {:.0}deg", pass.max_elevation_deg))
            .atom(format!("LOS {}Z", pass.los.format("%H:%M")))
            .atom(format!("az {:.0}", pass.los_azimuth_deg));
        if pass.visible {
            line = line.atom("visible");
        }
        response.push(line);
        Ok(response)
    }

    fn satfreq(&self, cmd: &Command) -> ProviderResult<Response> {
        let Target::Satellite(name) = &cmd.target else {
            return Err(ProviderError::NotFound);
        };
        let entries = self.refdata.satellite_frequencies(name);
        if entries.is_empty() {
            return Err(ProviderError::Empty);
        }
        let mut response = Response::new();
        let mut line = Line::new().atom(name.to_uppercase());
        for (i, e) in entries.iter().take(usize::from(cmd.top_n)).enumerate() {
            if entries.len() > 1 {
                line = line.atom(format!("#{}", i + 1));
            }
            if !e.uplink.is_empty() {
                line = line.atom(format!("up {}", e.uplink));
            }
            if !e.downlink.is_empty() {
                line = line.atom(format!("dn {}", e.downlink));
            }
            if !e.beacon.is_empty() {
                line = line.atom(format!("bcn {}", e.beacon));
            }
            if !e.mode.is_empty() {
                line = line.text(e.mode.clone());
            }
        }
        response.push(line);
        Ok(response)
    }

    async fn repeater(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        let Target::RepeaterFilter { band, mode } = &cmd.target else {
            return Err(ProviderError::NotFound);
        };
        let place = self.resolve(&cmd.target, sender).await?;
        let hits = self.refdata.repeaters_near(
            place.lat,
            place.lon,
            band.as_deref(),
            mode.as_deref(),
            usize::from(cmd.top_n),
        );
        if hits.is_empty() {
            return Err(ProviderError::Empty);
        }
        let metric = cmd.units == Units::Metric;
        let mut response = Response::new();
        for (i, (repeater, km)) in hits.iter().enumerate() {
            let (dist, unit) = if metric { (*km, "km") } else { (km / 1.609_344, "mi") };
            let brg = ab_geo::bearing_deg(place.lat, place.lon, repeater.lat, repeater.lon);
            let mut line = Line::new();
            if hits.len() > 1 {
                line = line.atom(format!("#{}", i + 1));
            }
            line = line
                .atom(repeater.call.clone())
                .atom(format!("{:.4}MHz", repeater.frequency_mhz));
            // Echo suppression: a filter the sender supplied is not
            // repeated back; detail beyond the first hit is abbreviated.
            if i == 0 {
                if mode.is_none() && !repeater.mode.is_empty() {
                    line = line.atom(repeater.mode.clone());
                }
                if band.is_none() {
                    if let Some(b) = repeater.band() {
                        line = line.atom(b);
                    }
                }
                if !repeater.city.is_empty() {
                    line = line.text(repeater.city.clone());
                }
            }
            line = line
                .atom(format!("Dst {dist:.0} {unit}"))
                .atom(format!("Brg {brg:.0} deg"));
            response.push(line);
        }
        Ok(response)
    }

    async fn osm(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        let Target::OsmPhrase(category) = &cmd.target else {
            return Err(ProviderError::NotFound);
        };
        let place = self.resolve(&cmd.target, sender).await?;
        let hits = retry_once(|| {
            self.providers
                .geocoder
                .nearby(place.lat, place.lon, category, usize::from(cmd.top_n))
        })
        .await?;
        let metric = cmd.units == Units::Metric;
        let mut response = Response::new();
        for (i, hit) in hits.iter().enumerate() {
            let km = ab_geo::distance_km(place.lat, place.lon, hit.lat, hit.lon);
            let (dist, unit) = if metric { (km, "km") } else { (km / 1.609_344, "mi") };
            let brg = ab_geo::bearing_deg(place.lat, place.lon, hit.lat, hit.lon);
            let mut line = Line::new();
            if hits.len() > 1 {
                line = line.atom(format!("#{}", i + 1));
            }
            let name = if i == 0 {
                hit.display_name.clone()
            } else {
                first_component(&hit.display_name).to_owned()
            };
            line = line
                .text(name)
                .atom(format!("Dst {dist:.1} {unit}"))
                .atom(format!("Brg {brg:.0} deg"));
            response.push(line);
        }
        Ok(response)
    }

    async fn dapnet(&self, cmd: &Command) -> ProviderResult<Response> {
        let Target::DapnetUser { user, text } = &cmd.target else {
            return Err(ProviderError::NotFound);
        };
        let high = cmd.action == Action::DapnetHighPri;
        retry_once(|| self.providers.pager.send(user, text, high)).await?;
        Ok(Response::plain(format!(
            "DAPNET message sent to {}",
            user.to_uppercase()
        )))
    }

    async fn posmsg(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        let Target::Email(address) = &cmd.target else {
            return Err(ProviderError::NotFound);
        };
        let mail = self
            .providers
            .mail
            .as_ref()
            .ok_or(ProviderError::Disabled)?;
        let own = retry_once(|| self.providers.position.position(sender)).await?;
        let address_text = self
            .providers
            .geocoder
            .reverse(own.lat, own.lon)
            .await
            .unwrap_or_else(|_| format!("{:.4}/{:.4}", own.lat, own.lon));
        let subject = format!("APRS position report for {}", own.callsign);
        let body = format!(
            "{} was last heard at {} ({:.4}/{:.4}, grid {})\n{}\n",
            own.callsign,
            own.last_heard.format("%Y-%m-%dT%H:%M:%SZ"),
            own.lat,
            own.lon,
            ab_geo::latlon_to_grid(own.lat, own.lon),
            address_text,
        );
        retry_once(|| mail.send_position(address, &subject, &body)).await?;
        Ok(Response::plain(format!("position sent to {address}")))
    }

    async fn sonde(&self, cmd: &Command, sender: &str) -> ProviderResult<Response> {
        let Target::OtherCallsign(serial) = &cmd.target else {
            return Err(ProviderError::NotFound);
        };
        let prediction = retry_once(|| self.providers.sonde.predict(serial)).await?;
        let mut line = Line::new()
            .atom(prediction.serial.clone())
            .atom(if prediction.descending {
                "descending"
            } else {
                "ascending"
            })
            .atom(format!(
                "landing {}Z",
                prediction.landing_time.format("%d-%b %H:%M")
            ))
            .atom(format!(
                "{:.3}/{:.3}",
                prediction.landing_lat, prediction.landing_lon
            ));
        // Range from the requester to the predicted landing, when the
        // requester's own position is known.
        if let Ok(own) = self.providers.position.position(sender).await {
            let km = ab_geo::distance_km(
                own.lat,
                own.lon,
                prediction.landing_lat,
                prediction.landing_lon,
            );
            let brg = ab_geo::bearing_deg(
                own.lat,
                own.lon,
                prediction.landing_lat,
                prediction.landing_lon,
            );
            line = line
                .atom(format!("Dst {km:.0} km"))
                .atom(format!("Brg {brg:.0} deg"));
        }
        let mut response = Response::new();
        response.push(line);
        Ok(response)
    }
}

/// Search start for pass computations: the window names an instant.
fn search_start(cmd: &Command, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = match cmd.date_offset {
        DateOffset::Today => now,
        DateOffset::Days(n) => {
            let date = (now + Duration::days(i64::from(n))).date_naive();
            match date.and_hms_opt(0, 0, 0) {
                Some(dt) => dt.and_utc(),
                None => now,
            }
        }
        DateOffset::Hours(n) => now + Duration::hours(i64::from(n)),
    };
    let hour = match cmd.daytime {
        Daytime::Full => return base,
        Daytime::Morning => 6,
        Daytime::Day => 12,
        Daytime::Evening => 18,
        Daytime::Night => 0,
    };
    match base.date_naive().and_hms_opt(hour, 0, 0) {
        Some(dt) => {
            let dt = dt.and_utc();
            if dt < now { now } else { dt }
        }
        None => base,
    }
}

async fn retry_once<T, F, Fut>(f: F) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    match f().await {
        Err(ProviderError::Unavailable(first)) => {
            warn!(error = %first, "provider call failed, retrying once");
            f().await
        }
        other => other,
    }
}

fn error_text(e: &ProviderError) -> &'static str {
    match e {
        ProviderError::Unavailable(_) => "service unavailable, please try again later",
        ProviderError::NotFound => "location not found",
        ProviderError::Empty => "no match for your query",
        ProviderError::Disabled => "feature disabled by configuration",
    }
}

fn first_component(display_name: &str) -> &str {
    display_name.split(',').next().unwrap_or(display_name).trim()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_handles_multi_word_cities() {
        assert_eq!(title_case("mountain view"), "Mountain View");
        assert_eq!(title_case("holzminden"), "Holzminden");
    }

    #[test]
    fn first_component_takes_the_head_of_an_address() {
        assert_eq!(
            first_component("Mountain View, Santa Clara County, California"),
            "Mountain View"
        );
        assert_eq!(first_component("Berlin"), "Berlin");
    }

    #[test]
    fn error_texts_fit_one_fragment() {
        for e in [
            ProviderError::Unavailable("x".into()),
            ProviderError::NotFound,
            ProviderError::Empty,
            ProviderError::Disabled,
        ] {
            assert!(error_text(&e).len() <= ab_protocol::PAYLOAD_MAX);
        }
    }

    #[test]
    fn search_start_projects_daytime_windows() {
        let now: DateTime<Utc> = "2021-01-15T10:00:00Z".parse().unwrap();
        let cmd = |date_offset, daytime| Command {
            action: Action::SatPass,
            target: Target::Satellite("iss".into()),
            date_offset,
            daytime,
            units: Units::Metric,
            language: "en".into(),
            top_n: 1,
            force_unicode: false,
            message_id: None,
        };
        // Tomorrow evening starts at 18:00 on the 16th.
        let start = search_start(&cmd(DateOffset::Days(1), Daytime::Evening), now);
        assert_eq!(start.to_rfc3339(), "2021-01-16T18:00:00+00:00");
        // Today morning is already past; never search the past.
        let start = search_start(&cmd(DateOffset::Today, Daytime::Morning), now);
        assert_eq!(start, now);
        // No window at all means "from now".
        let start = search_start(&cmd(DateOffset::Today, Daytime::Full), now);
        assert_eq!(start, now);
    }
}
