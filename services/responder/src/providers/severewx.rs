// DWD severe-weather warnings, per warncell.
//
// The feed is JSONP (`warnWetter.loadWarnings({...});`); the wrapper is
// stripped before parsing.  Timestamps are epoch milliseconds.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use super::{check_status, transport_err, ProviderResult, WarningProvider, WxWarning};

const WARNINGS_URL: &str = "https://www.dwd.de/DWD/warnungen/warnapp/json/warnings.json";

pub struct DwdWarnings {
    client: reqwest::Client,
}

impl DwdWarnings {
    pub fn new(client: reqwest::Client) -> Self {
        DwdWarnings { client }
    }
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    warnings: HashMap<String, Vec<Warning>>,
}

#[derive(Debug, Deserialize)]
struct Warning {
    headline: String,
    start: Option<i64>,
    end: Option<i64>,
}

/// Strip the `warnWetter.loadWarnings(...)` JSONP wrapper.
fn unwrap_jsonp(body: &str) -> &str {
    let start = body.find('(').map(|i| i + 1).unwrap_or(0);
    let end = body.rfind(')').unwrap_or(body.len());
    &body[start..end]
}

fn millis(ms: Option<i64>) -> Option<chrono::DateTime<chrono::Utc>> {
    ms.and_then(|v| DateTime::from_timestamp_millis(v))
}

#[async_trait]
impl WarningProvider for DwdWarnings {
    async fn active_warnings(&self, warncell: &str) -> ProviderResult<Vec<WxWarning>> {
        let resp = self
            .client
            .get(WARNINGS_URL)
            .send()
            .await
            .map_err(transport_err)?;
        let body = check_status(resp)?.text().await.map_err(transport_err)?;
        let feed: Feed = serde_json::from_str(unwrap_jsonp(&body))
            .map_err(|e| super::ProviderError::Unavailable(format!("bad feed: {e}")))?;
        let warnings = feed
            .warnings
            .get(warncell)
            .map(|list| {
                list.iter()
                    .map(|w| WxWarning {
                        warncell: warncell.to_owned(),
                        headline: w.headline.clone(),
                        onset: millis(w.start),
                        expires: millis(w.end),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonp_wrapper_is_stripped() {
        let body = r#"warnWetter.loadWarnings({"warnings": {}});"#;
        let feed: Feed = serde_json::from_str(unwrap_jsonp(body)).unwrap();
        assert!(feed.warnings.is_empty());
    }

    #[test]
    fn warnings_map_by_warncell() {
        let body = r#"warnWetter.loadWarnings({"warnings": {
            "103255000": [{"headline": "Amtliche WARNUNG vor STURMBOEEN",
                            "start": 1610790000000, "end": 1610815000000}]
        }});"#;
        let feed: Feed = serde_json::from_str(unwrap_jsonp(body)).unwrap();
        let list = feed.warnings.get("103255000").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].headline, "Amtliche WARNUNG vor STURMBOEEN");
    }
}
