// DAPNET pager gateway (hampager.de).
//
// One POST per page.  Credentials come from config; the `n0call` sentinel
// arrives here as an empty user and turns the provider off.

use async_trait::async_trait;
use serde::Serialize;

use super::{transport_err, PagerProvider, ProviderError, ProviderResult};

const CALLS_URL: &str = "https://hampager.de/api/calls";

/// Pager texts beyond this length are truncated by the network; refuse to
/// send silently mangled pages.
const PAGE_MAX: usize = 80;

pub struct Dapnet {
    client: reqwest::Client,
    user: String,
    password: String,
}

impl Dapnet {
    /// `user` empty means the gateway is disabled by configuration.
    pub fn new(client: reqwest::Client, user: &str, password: &str) -> Self {
        Dapnet {
            client,
            user: user.to_owned(),
            password: password.to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest {
    text: String,
    call_sign_names: Vec<String>,
    transmitter_group_names: Vec<String>,
    emergency: bool,
}

#[async_trait]
impl PagerProvider for Dapnet {
    async fn send(&self, user: &str, text: &str, high_priority: bool) -> ProviderResult<()> {
        if self.user.is_empty() {
            return Err(ProviderError::Disabled);
        }
        let mut text = text.to_owned();
        if text.len() > PAGE_MAX {
            let mut cut = PAGE_MAX;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        let body = CallRequest {
            text,
            call_sign_names: vec![user.to_lowercase()],
            transmitter_group_names: vec!["all".to_owned()],
            emergency: high_priority,
        };
        let resp = self
            .client
            .post(CALLS_URL)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // Unknown pager callsign.
            return Err(ProviderError::NotFound);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("dapnet status {status}")));
        }
        Ok(())
    }
}
