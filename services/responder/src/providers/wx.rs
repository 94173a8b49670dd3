// OpenWeatherMap one-call client.
//
// The upstream handles unit conversion (`units=metric|imperial`) and
// message localization (`lang=<code>`), so the daemon never converts
// temperatures itself.  The payload's `timezone_offset` is what the
// dispatcher uses to project daytime windows into local time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    check_status, transport_err, ProviderError, ProviderResult, WeatherProvider, WxDay,
    WxForecast, WxHour,
};

const ONECALL_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";

pub struct OpenWeatherMap {
    client: reqwest::Client,
    api_key: String,
}

impl OpenWeatherMap {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        OpenWeatherMap {
            client,
            api_key: api_key.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OneCall {
    timezone_offset: i32,
    #[serde(default)]
    daily: Vec<Daily>,
    #[serde(default)]
    hourly: Vec<Hourly>,
}

#[derive(Debug, Deserialize)]
struct Daily {
    dt: i64,
    sunrise: Option<i64>,
    sunset: Option<i64>,
    temp: DailyTemp,
    pressure: u32,
    humidity: u8,
    dew_point: f64,
    wind_speed: f64,
    wind_deg: u16,
    clouds: u8,
    #[serde(default)]
    uvi: f64,
    #[serde(default)]
    weather: Vec<WeatherDesc>,
}

#[derive(Debug, Deserialize)]
struct DailyTemp {
    morn: f64,
    day: f64,
    eve: f64,
    night: f64,
}

#[derive(Debug, Deserialize)]
struct Hourly {
    dt: i64,
    temp: f64,
    #[serde(default)]
    weather: Vec<WeatherDesc>,
}

#[derive(Debug, Deserialize)]
struct WeatherDesc {
    description: String,
}

fn utc(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn summary(weather: &[WeatherDesc]) -> String {
    weather
        .first()
        .map(|w| w.description.clone())
        .unwrap_or_default()
}

impl OneCall {
    fn into_forecast(self) -> WxForecast {
        let offset = self.timezone_offset;
        let days = self
            .daily
            .into_iter()
            .map(|d| WxDay {
                date: utc(d.dt + i64::from(offset)).date_naive(),
                summary: summary(&d.weather),
                temp_morn: d.temp.morn,
                temp_day: d.temp.day,
                temp_eve: d.temp.eve,
                temp_night: d.temp.night,
                sunrise: utc(d.sunrise.unwrap_or(d.dt)),
                sunset: utc(d.sunset.unwrap_or(d.dt)),
                clouds_pct: d.clouds,
                uvi: d.uvi,
                pressure_hpa: d.pressure,
                humidity_pct: d.humidity,
                dew_point: d.dew_point,
                wind_speed: d.wind_speed,
                wind_deg: d.wind_deg,
            })
            .collect();
        let hours = self
            .hourly
            .into_iter()
            .map(|h| WxHour {
                time: utc(h.dt),
                summary: summary(&h.weather),
                temp: h.temp,
            })
            .collect();
        WxForecast {
            utc_offset_secs: offset,
            days,
            hours,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMap {
    async fn forecast(
        &self,
        lat: f64,
        lon: f64,
        metric: bool,
        lang: &str,
    ) -> ProviderResult<WxForecast> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Disabled);
        }
        let units = if metric { "metric" } else { "imperial" };
        let resp = self
            .client
            .get(ONECALL_URL)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("units", units.to_owned()),
                ("lang", lang.to_owned()),
                ("exclude", "minutely,alerts".to_owned()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(transport_err)?;
        let payload: OneCall = check_status(resp)?
            .json()
            .await
            .map_err(transport_err)?;
        if payload.daily.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(payload.into_forecast())
    }
}
