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

//! # Multi-Server Dispatcher
//!
//! An asynchronous **fan-out HTTP client** built on top of [`tokio`] and [`reqwest`].
//!
//! One logical request is sent to a named set of equivalent servers (replicas,
//! shards, mirrors) and the outcome comes back keyed by server, with support for:
//!
//! - **Bounded concurrency** across the selected servers
//! - **Layered configuration**: global, per call, per server
//! - **Isolated failures**: one server failing never hides another's answer
//! - **Optional response parts**: raw body, decoded JSON, status line, transfer stats
//!
//! ## Core Concepts
//!
//! - [`MultiServerClient`] owns the server registry and the global configuration and
//!   runs dispatches.
//! - [`RequestOptions`] describe one call (headers, body, query, return flags, config).
//! - [`DispatchResult`] holds `results` and `errors`, both keyed by server.
//! - [`Transport`] is the seam to the HTTP stack; [`HttpTransport`] is the default.
//!
//! ## Example
//!
//! ```rust,no_run
//! use http::Method;
//! use multiserver_dispatch::{MultiServerClient, RequestOptions, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = MultiServerClient::new();
//!     client
//!         .add_server("eu", "https://eu.example.com", ServerOptions::default())
//!         .add_server("us", "https://us.example.com", ServerOptions::default())
//!         .set_concurrency(2);
//!
//!     let options = RequestOptions::new().with_json(&serde_json::json!({"key1": "value1"}))?;
//!     let all = client
//!         .dispatch(Method::POST, "/v1/items", &options, None, None, None)
//!         .await?;
//!
//!     for (server, result) in &all.results {
//!         println!("{server}: {:?}", result.json);
//!     }
//!     for (server, error) in &all.errors {
//!         eprintln!("{server}: {error}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Limitations
//!
//! - Every selected server is always targeted; there is no health-based selection or
//!   failover.
//! - No retries and no overall deadline beyond the per-request timeouts.
//!
//! ## License
//!
//! Licensed under [Apache 2.0](https://www.apache.org/licenses/LICENSE-2.0).
pub mod config;
mod constants;
mod dispatcher;
mod error;
pub mod outcome;
pub mod registry;
pub mod request;
pub mod transport;

pub use config::{ClientSettings, Configuration, RedirectSetting};
pub use constants::DEFAULT_CONCURRENCY;
pub use dispatcher::{MultiServerClient, ServerOverrides};
pub use error::{Error, Result};
pub use outcome::{DispatchResult, ServerError, ServerResult, SingleResult};
pub use registry::{ServerDescriptor, ServerOptions, ServerRegistry};
pub use request::{Body, RequestOptions, RequestSpec};
pub use transport::{HttpTransport, TransferStats, Transport, TransportError, TransportResponse};
