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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a whole call. Nothing has been sent when one of these is returned.
#[derive(Error, Debug)]
pub enum Error {
    #[error("server does not exist: {0}")]
    ServerNotFound(String),

    #[error("server unavailable: {0}")]
    TargetUnavailable(String),

    #[error("request body cannot be encoded as JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("query value for {0} must be a scalar or a list of scalars")]
    InvalidQuery(String),

    #[error("unsupported protocol version: {0}")]
    InvalidVersion(String),
}
