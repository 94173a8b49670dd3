// aprs.fi position lookup.
//
// Returns the last heard position for a callsign.  The API keys out
// numeric fields as strings; parse them defensively and treat a missing
// entry list as "station never heard".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    check_status, transport_err, PositionProvider, ProviderError, ProviderResult,
    StationPosition,
};

const API_URL: &str = "https://api.aprs.fi/api/get";

pub struct AprsFi {
    client: reqwest::Client,
    api_key: String,
}

impl AprsFi {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        AprsFi {
            client,
            api_key: api_key.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    result: String,
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    name: String,
    lat: String,
    lng: String,
    lasttime: String,
    comment: Option<String>,
}

impl Entry {
    fn into_position(self) -> ProviderResult<StationPosition> {
        let bad = |f: &str| ProviderError::Unavailable(format!("bad {f} in reply"));
        let lat: f64 = self.lat.parse().map_err(|_| bad("lat"))?;
        let lon: f64 = self.lng.parse().map_err(|_| bad("lng"))?;
        let secs: i64 = self.lasttime.parse().map_err(|_| bad("lasttime"))?;
        Ok(StationPosition {
            callsign: self.name,
            lat,
            lon,
            last_heard: DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now),
            comment: self.comment.filter(|c| !c.is_empty()),
        })
    }
}

#[async_trait]
impl PositionProvider for AprsFi {
    async fn position(&self, callsign: &str) -> ProviderResult<StationPosition> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Disabled);
        }
        let resp = self
            .client
            .get(API_URL)
            .query(&[
                ("name", callsign.to_owned()),
                ("what", "loc".to_owned()),
                ("apikey", self.api_key.clone()),
                ("format", "json".to_owned()),
            ])
            .send()
            .await
            .map_err(transport_err)?;
        let reply: ApiReply = check_status(resp)?.json().await.map_err(transport_err)?;
        if reply.result != "ok" {
            return Err(ProviderError::Unavailable(format!(
                "aprs.fi result {}",
                reply.result
            )));
        }
        reply
            .entries
            .into_iter()
            .next()
            .ok_or(ProviderError::NotFound)?
            .into_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_parses_stringly_numbers() {
        let entry: Entry = serde_json::from_str(
            r#"{"name": "DF1JSL-8", "lat": "51.8291", "lng": "9.4483",
                "lasttime": "1610786400", "comment": "QRV 145.500"}"#,
        )
        .unwrap();
        let pos = entry.into_position().unwrap();
        assert_eq!(pos.callsign, "DF1JSL-8");
        assert!((pos.lat - 51.8291).abs() < 1e-9);
        assert_eq!(pos.last_heard.timestamp(), 1610786400);
        assert_eq!(pos.comment.as_deref(), Some("QRV 145.500"));
    }

    #[test]
    fn reply_without_entries_is_not_found() {
        let reply: ApiReply =
            serde_json::from_str(r#"{"result": "ok", "entries": []}"#).unwrap();
        assert_eq!(reply.result, "ok");
        assert!(reply.entries.is_empty());
    }
}
