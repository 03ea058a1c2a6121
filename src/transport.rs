// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::ClientSettings;
use crate::request::RequestSpec;
use async_trait::async_trait;
use dashmap::DashMap;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Version};
use log::{debug, info};
use reqwest::redirect::Policy;
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("server responded with status {status}")]
    Status { status: StatusCode, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_timeout() {
            TransportError::Timeout(message)
        } else if err.is_connect() {
            TransportError::Connect(message)
        } else if err.is_builder() {
            TransportError::InvalidRequest(message)
        } else {
            TransportError::Other(message)
        }
    }
}

// reqwest's Display stops at the outermost error; the useful part
// ("Connection refused", "dns error") is further down the chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferStats {
    pub effective_uri: String,
    #[serde(serialize_with = "as_secs")]
    pub transfer_time: Duration,
    pub status: Option<u16>,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// A response whose body has been read in full.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: String,
    pub stats: TransferStats,
}

/// Sends one resolved request. Implementations must be safe to call from many
/// tasks at once; a dispatch shares one transport across all of its targets.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: RequestSpec) -> Result<TransportResponse, TransportError>;
}

/// Settings that can only be applied when a client is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConnectionProfile {
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    max_redirects: usize,
    verify: bool,
}

impl From<&ClientSettings> for ConnectionProfile {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout,
            read_timeout: settings.read_timeout,
            max_redirects: settings.allow_redirects.max_hops(),
            verify: settings.verify,
        }
    }
}

/// [`Transport`] backed by `reqwest`, with one pooled client per connection profile.
#[derive(Debug, Default)]
pub struct HttpTransport {
    clients: DashMap<ConnectionProfile, reqwest::Client>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, settings: &ClientSettings) -> Result<reqwest::Client, TransportError> {
        let profile = ConnectionProfile::from(settings);
        let entry = self
            .clients
            .entry(profile)
            .or_try_insert_with(|| build_client(&profile))?;
        Ok(entry.value().clone())
    }

    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

fn build_client(profile: &ConnectionProfile) -> Result<reqwest::Client, reqwest::Error> {
    debug!("building http client for {:?}", profile);
    let redirect = match profile.max_redirects {
        0 => Policy::none(),
        max => Policy::limited(max),
    };
    let mut builder = reqwest::Client::builder()
        .redirect(redirect)
        .danger_accept_invalid_certs(!profile.verify);
    if let Some(timeout) = profile.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = profile.read_timeout {
        builder = builder.read_timeout(timeout);
    }
    builder.build()
}

fn header_map(headers: &indexmap::IndexMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RequestSpec) -> Result<TransportResponse, TransportError> {
        let client = self.client(&request.settings)?;
        let headers = header_map(&request.headers)?;

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .version(request.version);
        if let Some(timeout) = request.settings.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        if request.settings.debug {
            info!(
                "[{}] {} {} {:?}",
                request.server, request.method, request.url, request.version
            );
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let effective_uri = response.url().to_string();

        if request.settings.debug {
            info!("[{}] {} responded {}", request.server, effective_uri, status);
        }

        if request.settings.http_errors && (status.is_client_error() || status.is_server_error()) {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let body = response.text().await?;
        Ok(TransportResponse {
            status,
            version,
            headers,
            body,
            stats: TransferStats {
                effective_uri,
                transfer_time: started.elapsed(),
                status: Some(status.as_u16()),
            },
        })
    }
}
