// aviationweather.gov METAR/TAF client.
//
// The `/api/data` endpoints return the raw observation text with
// `format=raw`, one report per line.  The text is opaque to the daemon;
// it is fragmented and forwarded as-is.

use async_trait::async_trait;

use super::{check_status, transport_err, AviationProvider, ProviderError, ProviderResult};

const METAR_URL: &str = "https://aviationweather.gov/api/data/metar";
const TAF_URL: &str = "https://aviationweather.gov/api/data/taf";

pub struct AviationWeather {
    client: reqwest::Client,
}

impl AviationWeather {
    pub fn new(client: reqwest::Client) -> Self {
        AviationWeather { client }
    }

    async fn fetch_raw(&self, url: &str, icao: &str) -> ProviderResult<String> {
        let resp = self
            .client
            .get(url)
            .query(&[("ids", icao.to_uppercase()), ("format", "raw".to_owned())])
            .send()
            .await
            .map_err(transport_err)?;
        let text = check_status(resp)?.text().await.map_err(transport_err)?;
        let first = text.lines().find(|l| !l.trim().is_empty());
        match first {
            Some(line) => Ok(line.trim().to_owned()),
            None => Err(ProviderError::NotFound),
        }
    }
}

#[async_trait]
impl AviationProvider for AviationWeather {
    async fn metar(&self, icao: &str) -> ProviderResult<String> {
        self.fetch_raw(METAR_URL, icao).await
    }

    async fn taf(&self, icao: &str) -> ProviderResult<String> {
        self.fetch_raw(TAF_URL, icao).await
    }
}
