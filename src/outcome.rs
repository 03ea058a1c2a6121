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

//! Per-server outcomes and their aggregation into a [`DispatchResult`].

use crate::request::{BuildError, RequestOptions};
use crate::transport::{TransferStats, TransportError, TransportResponse};
use http::header::HeaderMap;
use http::{StatusCode, Version};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Why a server has no result.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cannot build request: {0}")]
    Build(#[from] BuildError),

    #[error("request task aborted: {0}")]
    Aborted(String),
}

impl Serialize for ServerError {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Status line and headers of a response. The body is reported separately.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

impl Serialize for ResponseSnapshot {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let headers: HashMap<&str, String> = self
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let mut state = s.serialize_struct("ResponseSnapshot", 4)?;
        state.serialize_field("status", &self.status.as_u16())?;
        state.serialize_field("reason", &self.status.canonical_reason())?;
        state.serialize_field("version", &format!("{:?}", self.version))?;
        state.serialize_field("headers", &headers)?;
        state.end()
    }
}

/// Which parts of a response end up in a [`ServerResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnFlags {
    pub body: bool,
    pub json: bool,
    pub response: bool,
    pub stats: bool,
}

impl From<&RequestOptions> for ReturnFlags {
    fn from(options: &RequestOptions) -> Self {
        Self {
            body: options.return_body,
            json: options.return_json,
            response: options.return_response,
            stats: options.return_stats,
        }
    }
}

/// A server that answered. `error` carries a JSON decode failure; the entry still
/// counts as delivered.
#[derive(Debug, Serialize)]
pub struct ServerResult {
    pub server: String,
    pub body: Option<String>,
    pub json: Option<Value>,
    #[serde(serialize_with = "display_opt")]
    pub error: Option<serde_json::Error>,
    pub response: Option<ResponseSnapshot>,
    pub stats: Option<TransferStats>,
}

fn display_opt<S: Serializer>(e: &Option<serde_json::Error>, s: S) -> Result<S::Ok, S::Error> {
    match e {
        Some(e) => s.collect_str(e),
        None => s.serialize_none(),
    }
}

impl ServerResult {
    pub fn from_response(
        server: impl Into<String>,
        response: TransportResponse,
        flags: ReturnFlags,
    ) -> Self {
        let (json, error) = if flags.json {
            match serde_json::from_str::<Value>(&response.body) {
                Ok(value) => (Some(value), None),
                Err(e) => (None, Some(e)),
            }
        } else {
            (None, None)
        };

        Self {
            server: server.into(),
            body: flags.body.then_some(response.body),
            json,
            error,
            response: flags.response.then(|| ResponseSnapshot {
                status: response.status,
                version: response.version,
                headers: response.headers,
            }),
            stats: flags.stats.then_some(response.stats),
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.error.is_none()
    }
}

pub type Outcome = Result<ServerResult, ServerError>;

/// Aggregated outcome of one dispatch, keyed by server.
///
/// A targeted server appears in exactly one of `results` or `errors`. Failures that
/// cannot be tied to a server go to `unattributed`.
#[derive(Debug, Default, Serialize)]
pub struct DispatchResult {
    pub results: HashMap<String, ServerResult>,
    pub errors: HashMap<String, ServerError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unattributed: Vec<ServerError>,
}

impl DispatchResult {
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty() && self.unattributed.is_empty()
    }

    /// Some servers answered and some did not.
    pub fn is_partial(&self) -> bool {
        !self.results.is_empty() && !(self.errors.is_empty() && self.unattributed.is_empty())
    }

    pub fn len(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.unattributed.is_empty()
    }
}

/// Outcome of a single-server call.
#[derive(Debug, Default, Serialize)]
pub struct SingleResult {
    pub result: Option<ServerResult>,
    pub error: Option<ServerError>,
}

impl SingleResult {
    pub(crate) fn take(mut all: DispatchResult, server: &str) -> Self {
        let result = all.results.remove(server);
        let error = all
            .errors
            .remove(server)
            .or_else(|| all.unattributed.into_iter().next());
        Self { result, error }
    }

    pub fn into_result(self) -> Result<ServerResult, ServerError> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ServerError::Aborted("no outcome recorded".to_string())),
        }
    }
}

/// Collects outcomes as they complete. Only the dispatching task writes to it.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: DispatchResult,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, server: String, outcome: Outcome) {
        match outcome {
            Ok(result) => {
                self.inner.errors.remove(&server);
                self.inner.results.insert(server, result);
            }
            Err(error) => {
                self.inner.results.remove(&server);
                self.inner.errors.insert(server, error);
            }
        }
    }

    pub fn record_unattributed(&mut self, error: ServerError) {
        self.inner.unattributed.push(error);
    }

    pub fn finish(self) -> DispatchResult {
        self.inner
    }
}
