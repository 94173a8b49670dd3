// Citizen Weather Observer Program reports via findu.com.
//
// findu serves the last observation as an APRS weather packet embedded in
// an HTML page.  The packet grammar is positional: `_cccsssgttt` wind
// direction/speed/gust/temperature, then letter-tagged fields (`r` rain,
// `h` humidity, `b` barometric pressure).

use async_trait::async_trait;
use chrono::Utc;

use super::{check_status, transport_err, CwopProvider, CwopReport, ProviderError, ProviderResult};

const FINDU_URL: &str = "https://www.findu.com/cgi-bin/wx.cgi";

pub struct FinduCwop {
    client: reqwest::Client,
}

impl FinduCwop {
    pub fn new(client: reqwest::Client) -> Self {
        FinduCwop { client }
    }
}

#[async_trait]
impl CwopProvider for FinduCwop {
    async fn by_station(&self, station: &str) -> ProviderResult<CwopReport> {
        let resp = self
            .client
            .get(FINDU_URL)
            .query(&[("call", station.to_uppercase()), ("last", "1".to_owned())])
            .send()
            .await
            .map_err(transport_err)?;
        let page = check_status(resp)?.text().await.map_err(transport_err)?;
        parse_wx_page(station, &page).ok_or(ProviderError::NotFound)
    }

    async fn nearest(&self, _lat: f64, _lon: f64) -> ProviderResult<CwopReport> {
        // findu has no nearest-station query; the dispatcher resolves the
        // station id first (explicit id or none at all).
        Err(ProviderError::Empty)
    }
}

/// Pull the weather fields out of the first APRS weather body on the page.
fn parse_wx_page(station: &str, page: &str) -> Option<CwopReport> {
    let line = page.lines().find(|l| l.contains('_') && l.contains('b'))?;
    let at = line.find('_')?;
    let body = &line[at + 1..];
    parse_wx_body(station, body)
}

fn parse_wx_body(station: &str, body: &str) -> Option<CwopReport> {
    if body.len() < 11 {
        return None;
    }
    let wind_deg = body.get(0..3).and_then(|s| s.parse::<u16>().ok());
    let wind_mph = body.get(4..7).and_then(|s| s.parse::<f64>().ok());
    let temp_f = body
        .find('t')
        .and_then(|i| body.get(i + 1..i + 4))
        .and_then(|s| s.parse::<f64>().ok());
    let humidity = body
        .find('h')
        .and_then(|i| body.get(i + 1..i + 3))
        .and_then(|s| s.parse::<u8>().ok());
    let pressure = body
        .find('b')
        .and_then(|i| body.get(i + 1..i + 6))
        .and_then(|s| s.parse::<f64>().ok())
        .map(|tenths| tenths / 10.0);
    let rain_in = body
        .find('r')
        .and_then(|i| body.get(i + 1..i + 4))
        .and_then(|s| s.parse::<f64>().ok())
        .map(|hundredths| hundredths / 100.0);

    Some(CwopReport {
        station: station.to_uppercase(),
        time: Utc::now(),
        temp_c: temp_f.map(|f| (f - 32.0) * 5.0 / 9.0),
        wind_deg,
        wind_kmh: wind_mph.map(|mph| mph * 1.609_344),
        humidity_pct: humidity,
        pressure_hpa: pressure,
        rain_mm: rain_in.map(|inches| inches * 25.4),
    })
}
