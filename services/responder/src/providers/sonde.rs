// SondeHub landing predictions for radiosondes.
//
// The predictor returns one entry per vehicle; the flight path sits in a
// nested JSON string (`data`), of which only the final point; the
// predicted landing; matters here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    check_status, transport_err, ProviderError, ProviderResult, SondePrediction, SondeProvider,
};

const PREDICTIONS_URL: &str = "https://api.v2.sondehub.org/predictions";

pub struct SondeHub {
    client: reqwest::Client,
}

impl SondeHub {
    pub fn new(client: reqwest::Client) -> Self {
        SondeHub { client }
    }
}

#[derive(Debug, Deserialize)]
struct PredictionEntry {
    vehicle: String,
    #[serde(default)]
    descending: Option<bool>,
    /// JSON-encoded array of path points.
    data: String,
}

#[derive(Debug, Deserialize)]
struct PathPoint {
    time: i64,
    lat: f64,
    lon: f64,
}

impl PredictionEntry {
    fn into_prediction(self) -> ProviderResult<SondePrediction> {
        let path: Vec<PathPoint> = serde_json::from_str(&self.data)
            .map_err(|e| ProviderError::Unavailable(format!("bad path data: {e}")))?;
        let landing = path.last().ok_or(ProviderError::Empty)?;
        Ok(SondePrediction {
            serial: self.vehicle,
            landing_lat: landing.lat,
            landing_lon: landing.lon,
            landing_time: DateTime::from_timestamp(landing.time, 0).unwrap_or_else(Utc::now),
            descending: self.descending.unwrap_or(false),
        })
    }
}

#[async_trait]
impl SondeProvider for SondeHub {
    async fn predict(&self, serial: &str) -> ProviderResult<SondePrediction> {
        let resp = self
            .client
            .get(PREDICTIONS_URL)
            .query(&[("vehicles", serial.to_uppercase())])
            .send()
            .await
            .map_err(transport_err)?;
        let entries: Vec<PredictionEntry> =
            check_status(resp)?.json().await.map_err(transport_err)?;
        entries
            .into_iter()
            .next()
            .ok_or(ProviderError::NotFound)?
            .into_prediction()
    }
}
