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

//! HTTP front end that fans each request out to a fixed fleet.
//!
//! ```text
//! MULTISERVER_SERVERS="a=http://10.0.0.1:8000,b=http://10.0.0.2:8000" \
//! MULTISERVER_CONCURRENCY=8 cargo run --example fanout_gateway
//!
//! curl -XPOST localhost:8080/dispatch -d '{"method":"GET","path":"/health"}'
//! ```

use anyhow::{Context, anyhow};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use env_logger::Env;
use http::{Method, StatusCode};
use indexmap::IndexMap;
use log::info;
use multiserver_dispatch::{
    DispatchResult, MultiServerClient, RequestOptions, ServerDescriptor, ServerOptions,
    ServerOverrides,
};
use serde::Deserialize;
use std::env::var;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let mut client = MultiServerClient::new();
    let servers = var("MULTISERVER_SERVERS").context("MULTISERVER_SERVERS is not set")?;
    for entry in servers.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, uri) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=uri, got {entry}"))?;
        info!("registering server {} at {}", key, uri);
        client.add_server(key, uri, ServerOptions::default());
    }
    if let Ok(n) = var("MULTISERVER_CONCURRENCY") {
        client.set_concurrency(n.parse().context("MULTISERVER_CONCURRENCY")?);
    }

    let app = Router::new()
        .route("/dispatch", post(dispatch))
        .route("/servers", get(servers_list))
        .with_state(Api {
            client: Arc::new(client),
        });

    let addr = var("MULTISERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    info!("fan-out gateway listening: {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Clone)]
pub(crate) struct Api {
    pub(crate) client: Arc<MultiServerClient>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

#[derive(Deserialize)]
pub(crate) struct DispatchRequest {
    method: String,
    path: String,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    targets: Option<Vec<String>>,
    #[serde(default)]
    overrides: Option<ServerOverrides>,
    #[serde(flatten)]
    options: RequestOptions,
}

pub(crate) async fn dispatch(
    State(Api { client }): State<Api>,
    Json(req): Json<DispatchRequest>,
) -> ApiResult<Json<DispatchResult>> {
    let method = Method::from_bytes(req.method.to_ascii_uppercase().as_bytes())
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid method: {e}")))?;
    let targets: Option<Vec<&str>> = req
        .targets
        .as_ref()
        .map(|keys| keys.iter().map(String::as_str).collect());

    match client
        .dispatch(
            method,
            &req.path,
            &req.options,
            req.concurrency,
            targets.as_deref(),
            req.overrides.as_ref(),
        )
        .await
    {
        Ok(all) => Ok(Json(all)),
        Err(e) => Err((StatusCode::BAD_REQUEST, format!("dispatch rejected: {e}"))),
    }
}

pub(crate) async fn servers_list(
    State(Api { client }): State<Api>,
) -> Json<IndexMap<String, ServerDescriptor>> {
    Json(client.servers())
}
