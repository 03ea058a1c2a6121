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

use crate::config::Configuration;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Serialize;

/// Options accepted when registering a server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerOptions {
    /// Configuration applied to this server only, above every per-call layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Configuration>,
}

impl ServerOptions {
    pub fn with_configuration(configuration: Configuration) -> Self {
        Self {
            configuration: Some(configuration),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerDescriptor {
    pub uri: String,
    #[serde(flatten)]
    pub options: ServerOptions,
}

impl ServerDescriptor {
    pub fn configuration(&self) -> Option<&Configuration> {
        self.options.configuration.as_ref()
    }
}

/// Named servers in registration order.
///
/// The registry is owned by a single client and mutated through `&mut`, so no
/// write can overlap a dispatch that is reading it.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: IndexMap<String, ServerDescriptor>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the descriptor, replacing any previous one under `key` in place.
    pub fn add(&mut self, key: impl Into<String>, uri: impl Into<String>, options: ServerOptions) {
        self.servers.insert(
            key.into(),
            ServerDescriptor {
                uri: uri.into(),
                options,
            },
        );
    }

    pub fn get(&self, key: &str) -> Result<&ServerDescriptor> {
        self.servers
            .get(key)
            .ok_or_else(|| Error::ServerNotFound(key.to_string()))
    }

    /// Returns whether a descriptor was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.servers.shift_remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.servers.contains_key(key)
    }

    pub fn list(&self) -> IndexMap<String, ServerDescriptor> {
        self.servers.clone()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServerDescriptor)> {
        self.servers.iter()
    }
}
