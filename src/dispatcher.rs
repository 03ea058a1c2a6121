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

use crate::config::{self, Configuration};
use crate::constants::DEFAULT_CONCURRENCY;
use crate::error::{Error, Result};
use crate::outcome::{
    DispatchResult, Outcome, ResultAggregator, ReturnFlags, ServerError, ServerResult, SingleResult,
};
use crate::registry::{ServerDescriptor, ServerOptions, ServerRegistry};
use crate::request::{RequestOptions, RequestTemplate};
use crate::transport::{HttpTransport, Transport};
use http::Method;
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};

/// Per-call configuration keyed by server. Outranks the server's stored configuration.
pub type ServerOverrides = HashMap<String, Configuration>;

/// Sends one request to a named set of servers.
///
/// Registration and configuration take `&mut self`; dispatching takes `&self`. The
/// registry therefore cannot change while a dispatch is reading it.
#[derive(Debug)]
pub struct MultiServerClient<T = HttpTransport> {
    servers: ServerRegistry,
    configuration: Configuration,
    default_concurrency: usize,
    transport: Arc<T>,
}

impl MultiServerClient<HttpTransport> {
    pub fn new() -> Self {
        Self::with_transport(HttpTransport::new())
    }
}

impl Default for MultiServerClient<HttpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> MultiServerClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            servers: ServerRegistry::new(),
            configuration: config::default_configuration(),
            default_concurrency: DEFAULT_CONCURRENCY,
            transport: Arc::new(transport),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sets the ceiling used when a dispatch does not give one. `0` is raised to `1`
    /// and values above [`Semaphore::MAX_PERMITS`] are lowered to it.
    pub fn set_concurrency(&mut self, n: usize) -> &mut Self {
        if n == 0 {
            warn!("concurrency of 0 would never submit a request, using 1");
        }
        self.default_concurrency = n.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.default_concurrency
    }

    pub fn default_configuration() -> Configuration {
        config::default_configuration()
    }

    /// Deep-merges `conf` into the global configuration.
    pub fn set_configuration(&mut self, conf: &Configuration) -> &mut Self {
        config::merge_into(&mut self.configuration, conf);
        self
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Adds a server, or replaces the one registered under `key`.
    pub fn add_server(
        &mut self,
        key: impl Into<String>,
        uri: impl Into<String>,
        options: ServerOptions,
    ) -> &mut Self {
        self.servers.add(key, uri, options);
        self
    }

    /// # Errors
    ///
    /// [`Error::ServerNotFound`] when nothing is registered under `key`.
    pub fn server(&self, key: &str) -> Result<&ServerDescriptor> {
        self.servers.get(key)
    }

    pub fn servers(&self) -> IndexMap<String, ServerDescriptor> {
        self.servers.list()
    }

    /// Returns `false` when nothing was registered under `key`.
    pub fn remove_server(&mut self, key: &str) -> bool {
        self.servers.remove(key)
    }

    /// Sends `method path` to every selected server and waits for all of them.
    ///
    /// `targets` selects servers by key (all registered servers when `None`);
    /// `concurrency` bounds how many requests are in flight at once and falls back to
    /// the client default when absent or zero. Requests are submitted in registration
    /// order; completion order is unspecified.
    ///
    /// # Errors
    ///
    /// Caller errors only, returned before anything is sent:
    /// [`Error::TargetUnavailable`] for the first unknown key in `targets`, and
    /// [`Error::InvalidQuery`] / [`Error::InvalidVersion`] for shared options that
    /// cannot be encoded. Per-server failures are reported in the result.
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
        concurrency: Option<usize>,
        targets: Option<&[&str]>,
        overrides: Option<&ServerOverrides>,
    ) -> Result<DispatchResult> {
        if let Some(keys) = targets {
            if let Some(missing) = keys.iter().find(|key| !self.servers.contains(key)) {
                return Err(Error::TargetUnavailable(missing.to_string()));
            }
        }

        let template = RequestTemplate::new(method.clone(), path, options, &self.configuration)?;
        let flags = ReturnFlags::from(options);

        let selected: Vec<_> = self
            .servers
            .iter()
            .filter(|(key, _)| targets.is_none_or(|keys| keys.contains(&key.as_str())))
            .collect();

        // More permits than targets would never be used.
        let ceiling = match concurrency {
            Some(n) if n > 0 => n,
            _ => self.default_concurrency,
        }
        .min(selected.len())
        .max(1);

        info!(
            "dispatching {} {} to {} servers, concurrency {}",
            method,
            path,
            selected.len(),
            ceiling
        );

        let semaphore = Arc::new(Semaphore::new(ceiling));
        let mut tasks: JoinSet<(String, Outcome)> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, String> = HashMap::new();
        let mut aggregator = ResultAggregator::new();

        for (key, descriptor) in selected {
            let server_overrides = overrides.and_then(|o| o.get(key));
            let request = match template.build(key, descriptor, server_overrides) {
                Ok(request) => request,
                Err(e) => {
                    warn!("server {} skipped: {}", key, e);
                    aggregator.record(key.clone(), Err(e.into()));
                    continue;
                }
            };

            // The semaphore lives as long as this call and is never closed.
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                aggregator.record(
                    key.clone(),
                    Err(ServerError::Aborted("concurrency limiter closed".to_string())),
                );
                continue;
            };

            let transport = Arc::clone(&self.transport);
            let server = key.clone();
            debug!("server {} in flight", server);
            let handle = tasks.spawn(async move {
                let outcome = match transport.send(request).await {
                    Ok(response) => Ok(ServerResult::from_response(&server, response, flags)),
                    Err(e) => Err(ServerError::from(e)),
                };
                drop(permit);
                (server, outcome)
            });
            in_flight.insert(handle.id(), key.clone());
        }

        while let Some(joined) = tasks.join_next().await {
            settle(&mut aggregator, &in_flight, joined);
        }

        let all = aggregator.finish();
        info!(
            "dispatch {} {} finished: {} results, {} errors",
            method,
            path,
            all.results.len(),
            all.errors.len() + all.unattributed.len()
        );
        Ok(all)
    }

    /// [`dispatch`](Self::dispatch) to the single server `key`.
    ///
    /// # Errors
    ///
    /// Same caller errors as [`dispatch`](Self::dispatch).
    pub async fn send_to_one(
        &self,
        key: &str,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<SingleResult> {
        let all = self
            .dispatch(method, path, options, None, Some(&[key][..]), None)
            .await?;
        Ok(SingleResult::take(all, key))
    }
}

fn settle(
    aggregator: &mut ResultAggregator,
    in_flight: &HashMap<task::Id, String>,
    joined: std::result::Result<(String, Outcome), JoinError>,
) {
    match joined {
        Ok((server, outcome)) => {
            match &outcome {
                Ok(result) if !result.is_decoded() => {
                    debug!("server {} answered with a body that is not JSON", server)
                }
                Ok(_) => debug!("server {} succeeded", server),
                Err(e) => warn!("server {} failed: {}", server, e),
            }
            aggregator.record(server, outcome);
        }
        Err(e) => {
            let reason = if e.is_panic() {
                "request task panicked".to_string()
            } else {
                e.to_string()
            };
            match in_flight.get(&e.id()) {
                Some(server) => {
                    error!("server {} aborted: {}", server, reason);
                    aggregator.record(server.clone(), Err(ServerError::Aborted(reason)));
                }
                None => {
                    error!("unattributed task failure: {}", reason);
                    aggregator.record_unattributed(ServerError::Aborted(reason));
                }
            }
        }
    }
}
