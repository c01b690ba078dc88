//! [`ObjectStore`] over the S3 REST API.
//!
//! Objects are addressed virtual-host style, `<endpoint>/<key>`, where the
//! endpoint defaults to `https://<bucket>.s3.amazonaws.com`. Uploads are
//! signed (see [`signing`](super::signing)); probes are anonymous HEADs
//! against publicly readable objects. A bucket that does not grant list
//! access answers 403 rather than 404 for a missing key, so both count as
//! absent.

use super::signing::{self, Credentials};
use super::{ObjectStore, Probe, SyncError};
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, ETAG, EXPIRES};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    endpoint: String,
    bucket: String,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(endpoint: &str, bucket: &str, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            credentials,
        }
    }

    pub fn url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }

    fn transport(method: &'static str, key: &str) -> impl FnOnce(reqwest::Error) -> SyncError {
        let key = key.to_string();
        move |source| SyncError::Transport {
            method,
            key,
            source,
        }
    }
}

fn unexpected(method: &'static str, key: &str, response: Response) -> SyncError {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("").to_string();
    let body = response.text().unwrap_or_default();
    SyncError::UnexpectedStatus {
        method,
        key: key.to_string(),
        status: status.as_u16(),
        reason,
        body,
    }
}

impl ObjectStore for S3Store {
    fn head(&self, key: &str) -> Result<Probe, SyncError> {
        let response = self
            .client
            .head(self.url(key))
            .send()
            .map_err(Self::transport("HEAD", key))?;

        match response.status() {
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim_matches('"').to_string())
                    .ok_or_else(|| SyncError::MissingEtag {
                        key: key.to_string(),
                    })?;
                debug!(key, etag = %etag, "HEAD found object");
                Ok(Probe::Present { etag })
            }
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!(key, status = response.status().as_u16(), "HEAD found nothing");
                Ok(Probe::Absent)
            }
            _ => Err(unexpected("HEAD", key, response)),
        }
    }

    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), SyncError> {
        let now = Utc::now();
        let date = signing::http_date(now);
        let to_sign = signing::string_to_sign("PUT", content_type, &date, &self.bucket, key);
        debug!(key, string_to_sign = ?to_sign, "signing PUT");

        let response = self
            .client
            .put(self.url(key))
            .header(AUTHORIZATION, self.credentials.authorization(&to_sign))
            .header(CONTENT_LENGTH, body.len())
            .header(CONTENT_TYPE, content_type)
            .header(DATE, &date)
            .header(EXPIRES, signing::expires(now))
            .body(body.to_vec())
            .send()
            .map_err(Self::transport("PUT", key))?;

        if response.status() != StatusCode::OK {
            return Err(unexpected("PUT", key, response));
        }
        Ok(())
    }
}
