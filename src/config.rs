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

//! Layered client configuration.
//!
//! A configuration is an ordered JSON object. Layers are folded left to right with
//! [`merge`]: nested objects merge key by key, every other value (scalars, lists,
//! and any value whose type differs between layers) is replaced wholesale by the
//! later layer.

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, DEFAULT_READ_TIMEOUT, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::time::Duration;

pub type Configuration = Map<String, Value>;

/// Factory defaults used as the global layer of a new client.
pub fn default_configuration() -> Configuration {
    let mut headers = Map::new();
    headers.insert("Accept-Encoding".into(), "gzip".into());
    headers.insert("Accept".into(), "application/json".into());
    headers.insert("User-Agent".into(), DEFAULT_USER_AGENT.into());

    let mut conf = Map::new();
    conf.insert("http_errors".into(), true.into());
    conf.insert("connect_timeout".into(), DEFAULT_CONNECT_TIMEOUT.into());
    conf.insert("timeout".into(), DEFAULT_TIMEOUT.into());
    conf.insert("read_timeout".into(), DEFAULT_READ_TIMEOUT.into());
    conf.insert("debug".into(), false.into());
    conf.insert("allow_redirects".into(), true.into());
    conf.insert("verify".into(), true.into());
    conf.insert("headers".into(), Value::Object(headers));
    conf
}

/// Folds `layers` left to right; later layers win. Absent layers count as empty.
pub fn merge<'a, I>(layers: I) -> Configuration
where
    I: IntoIterator<Item = Option<&'a Configuration>>,
{
    layers
        .into_iter()
        .flatten()
        .fold(Configuration::new(), |mut acc, layer| {
            merge_into(&mut acc, layer);
            acc
        })
}

/// Deep-replace `overlay` into `base` in place.
pub fn merge_into(base: &mut Configuration, overlay: &Configuration) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_into(existing, nested),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// How redirects are followed: `true`, `false`, or `{"max": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RedirectSetting {
    Enabled(bool),
    Limited { max: usize },
}

impl RedirectSetting {
    /// Maximum number of hops; `0` disables redirects.
    pub fn max_hops(&self) -> usize {
        match *self {
            RedirectSetting::Enabled(true) => DEFAULT_MAX_REDIRECTS,
            RedirectSetting::Enabled(false) => 0,
            RedirectSetting::Limited { max } => max,
        }
    }
}

/// Typed view of the keys the HTTP transport understands. Other keys are carried
/// in the configuration tree but ignored here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub http_errors: bool,
    #[serde(deserialize_with = "seconds")]
    pub connect_timeout: Option<Duration>,
    #[serde(deserialize_with = "seconds")]
    pub timeout: Option<Duration>,
    #[serde(deserialize_with = "seconds")]
    pub read_timeout: Option<Duration>,
    pub allow_redirects: RedirectSetting,
    pub verify: bool,
    pub debug: bool,
    pub headers: IndexMap<String, String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            http_errors: true,
            connect_timeout: Some(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT)),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT)),
            read_timeout: Some(Duration::from_secs(DEFAULT_READ_TIMEOUT)),
            allow_redirects: RedirectSetting::Enabled(true),
            verify: true,
            debug: false,
            headers: IndexMap::new(),
        }
    }
}

impl ClientSettings {
    pub fn from_configuration(conf: &Configuration) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(conf.clone()))
    }
}

// Seconds as an integer or float; `0` and `null` mean "no limit".
fn seconds<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(secs) if !secs.is_finite() || secs < 0.0 => Err(D::Error::custom(format!(
            "invalid number of seconds: {secs}"
        ))),
        Some(secs) if secs == 0.0 => Ok(None),
        Some(secs) => Ok(Some(Duration::from_secs_f64(secs))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conf(value: Value) -> Configuration {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn later_layer_overrides_only_its_keys() {
        let global = conf(json!({"timeout": 30, "debug": false}));
        let call = conf(json!({"debug": true}));

        let merged = merge([Some(&global), Some(&call)]);

        assert_eq!(Value::Object(merged), json!({"timeout": 30, "debug": true}));
    }

    #[test]
    fn nested_objects_merge_key_by_key() {
        let base = conf(json!({"headers": {"Accept": "application/json", "User-Agent": "a"}}));
        let overlay = conf(json!({"headers": {"User-Agent": "b"}}));

        let merged = merge([Some(&base), Some(&overlay)]);

        assert_eq!(
            Value::Object(merged),
            json!({"headers": {"Accept": "application/json", "User-Agent": "b"}})
        );
    }

    #[test]
    fn lists_and_type_mismatches_replace() {
        let base = conf(json!({"list": [1, 2, 3], "shape": {"a": 1}, "scalar": 1}));
        let overlay = conf(json!({"list": [9], "shape": [1], "scalar": {"b": 2}}));

        let merged = merge([Some(&base), Some(&overlay)]);

        assert_eq!(
            Value::Object(merged),
            json!({"list": [9], "shape": [1], "scalar": {"b": 2}})
        );
    }

    #[test]
    fn absent_layers_are_empty() {
        let only = conf(json!({"debug": true}));
        assert_eq!(merge([None, Some(&only), None]), only);
        assert!(merge(std::iter::empty()).is_empty());
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let base = conf(json!({"headers": {"Accept": "text/plain"}}));
        let overlay = conf(json!({"headers": {"Accept": "application/json"}}));
        let _ = merge([Some(&base), Some(&overlay)]);
        assert_eq!(base["headers"]["Accept"], "text/plain");
    }

    #[test]
    fn default_configuration_reads_as_default_settings() {
        let settings = ClientSettings::from_configuration(&default_configuration()).unwrap();
        assert!(settings.http_errors);
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(settings.allow_redirects.max_hops(), DEFAULT_MAX_REDIRECTS);
        assert_eq!(settings.headers["User-Agent"], DEFAULT_USER_AGENT);
    }

    #[test]
    fn settings_accept_fractional_and_zero_timeouts() {
        let settings = ClientSettings::from_configuration(&conf(json!({
            "timeout": 1.5,
            "connect_timeout": 0,
            "allow_redirects": {"max": 2},
            "unknown_key": "ignored",
        })))
        .unwrap();

        assert_eq!(settings.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(settings.connect_timeout, None);
        assert_eq!(settings.allow_redirects.max_hops(), 2);
    }

    #[test]
    fn settings_reject_wrong_types() {
        assert!(ClientSettings::from_configuration(&conf(json!({"timeout": "soon"}))).is_err());
        assert!(ClientSettings::from_configuration(&conf(json!({"timeout": -1}))).is_err());
        assert!(ClientSettings::from_configuration(&conf(json!({"headers": {"X": 1}}))).is_err());
    }
}
