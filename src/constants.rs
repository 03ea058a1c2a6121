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

/// Number of servers with a request in flight when the caller does not say otherwise.
pub const DEFAULT_CONCURRENCY: usize = 4;

pub const DEFAULT_PROTOCOL_VERSION: &str = "1.1";

pub const DEFAULT_USER_AGENT: &str = "MultiServerClient/1.0";

/// Seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;
pub const DEFAULT_TIMEOUT: u64 = 30;
pub const DEFAULT_READ_TIMEOUT: u64 = 30;

/// Redirect hops followed when `allow_redirects` is `true` without an explicit limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";
