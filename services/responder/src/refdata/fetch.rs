// Reference-file fetcher: HTTP to temp file, then atomic rename.
//
// The `.stamp` sidecar carries the last successful refresh as RFC 3339;
// its age drives the refresh schedule.  A failed download leaves the old
// file (and stamp) untouched.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

fn stamp_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".stamp");
    PathBuf::from(p)
}

/// Last successful refresh of `path`, if it ever happened.
pub fn last_refreshed(path: &Path) -> Option<DateTime<Utc>> {
    let text = std::fs::read_to_string(stamp_path(path)).ok()?;
    text.trim().parse().ok()
}

/// Whether `path` is due for a refresh given the interval.
pub fn is_due(path: &Path, interval: std::time::Duration) -> bool {
    match last_refreshed(path) {
        Some(at) => {
            let age = Utc::now().signed_duration_since(at);
            age.to_std().map(|a| a >= interval).unwrap_or(true)
        }
        None => true,
    }
}

/// Temp-file path for a download of `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

/// Download `url` into the temp file next to `path`.  One retry on
/// transport failure, then the error surfaces to the scheduler (which
/// logs and keeps the previous file).  Nothing is committed here: the
/// rename into place happens on the scheduler tick via [`commit`], so
/// the data directory only ever has one writer.
pub async fn download_to_temp(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<(), FetchError> {
    let body = match get_bytes(client, url).await {
        Ok(b) => b,
        Err(first) => {
            debug!(error = %first, url, "download failed, retrying once");
            get_bytes(client, url).await?
        }
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(temp_path(path), &body)?;
    debug!(url, bytes = body.len(), "reference download staged");
    Ok(())
}

/// Atomically move a staged download into place and stamp it.
pub fn commit(path: &Path) -> Result<(), FetchError> {
    std::fs::rename(temp_path(path), path)?;
    std::fs::write(stamp_path(path), format!("{}\n", Utc::now().to_rfc3339()))?;
    info!(path = %path.display(), "reference file refreshed");
    Ok(())
}

async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(FetchError::Http(format!("status {}", resp.status())));
    }
    Ok(resp
        .bytes()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?
        .to_vec())
}
