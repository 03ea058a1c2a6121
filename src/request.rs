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

//! Request options shared by every target of a call, and the per-target
//! [`RequestSpec`] built from them.

use crate::config::{self, ClientSettings, Configuration};
use crate::constants::{CONTENT_TYPE, DEFAULT_PROTOCOL_VERSION, JSON_CONTENT_TYPE};
use crate::error::{Error, Result};
use crate::registry::ServerDescriptor;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Version};
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// RFC 3986 unreserved characters are left as they are; a space becomes `%20`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Request payload. Objects and arrays are encoded as JSON; scalars are sent as
/// their text, and `null` sends no body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum Body {
    Raw(String),
    Json(Value),
}

impl Body {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Body::from(serde_json::to_value(value)?))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Body::Raw(String::new()),
            Value::String(raw) => Body::Raw(raw),
            scalar @ (Value::Bool(_) | Value::Number(_)) => Body::Raw(scalar.to_string()),
            structured @ (Value::Object(_) | Value::Array(_)) => Body::Json(structured),
        }
    }
}

impl From<String> for Body {
    fn from(raw: String) -> Self {
        Body::Raw(raw)
    }
}

impl From<&str> for Body {
    fn from(raw: &str) -> Self {
        Body::Raw(raw.to_string())
    }
}

/// Options for one call, applied to every selected server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub headers: IndexMap<String, String>,
    pub body: Option<Body>,
    pub query: Option<Map<String, Value>>,
    pub version: Option<String>,
    pub return_body: bool,
    pub return_json: bool,
    pub return_response: bool,
    pub return_stats: bool,
    pub config: Option<Configuration>,
    pub configuration: Option<Configuration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: IndexMap::new(),
            body: None,
            query: None,
            version: None,
            return_body: true,
            return_json: true,
            return_response: false,
            return_stats: false,
            config: None,
            configuration: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Converts `value` to a body; objects and arrays become a structured body.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBody`] when `value` has no JSON representation.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = Some(Body::json(value)?);
        Ok(self)
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn return_body(mut self, yes: bool) -> Self {
        self.return_body = yes;
        self
    }

    pub fn return_json(mut self, yes: bool) -> Self {
        self.return_json = yes;
        self
    }

    pub fn return_response(mut self, yes: bool) -> Self {
        self.return_response = yes;
        self
    }

    pub fn return_stats(mut self, yes: bool) -> Self {
        self.return_stats = yes;
        self
    }

    pub fn with_config(mut self, config: Configuration) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }
}

/// Per-target construction failures. They land in that target's error slot.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("invalid server uri {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] serde_json::Error),
}

/// A fully resolved request for one server.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub server: String,
    pub method: Method,
    pub url: Url,
    /// Header names keep the case they were given in.
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
    pub version: Version,
    pub settings: ClientSettings,
    /// The merged configuration tree the settings were read from.
    pub configuration: Configuration,
}

/// The target-independent part of a call, prepared once and stamped out per server.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    path: String,
    body: Option<String>,
    /// Structured body with no `Content-Type` among the request's own headers.
    inject_content_type: bool,
    query: Option<String>,
    version: Version,
    call_layer: Configuration,
}

impl RequestTemplate {
    /// Folds the global and per-call layers and encodes the shared parts of the request.
    ///
    /// # Errors
    ///
    /// Caller errors: an unsupported protocol version or a query value that cannot be
    /// flattened into `key=value` pairs.
    pub fn new(
        method: Method,
        path: &str,
        options: &RequestOptions,
        global: &Configuration,
    ) -> Result<Self> {
        let version =
            parse_version(options.version.as_deref().unwrap_or(DEFAULT_PROTOCOL_VERSION))?;
        let query = options.query.as_ref().map(encode_query).transpose()?;

        let (body, json_body) = match &options.body {
            None => (None, false),
            Some(Body::Raw(raw)) if raw.is_empty() => (None, false),
            Some(Body::Raw(raw)) => (Some(raw.clone()), false),
            Some(Body::Json(value)) => (Some(serde_json::to_string(value)?), true),
        };
        let inject_content_type = json_body && !has_content_type(options.headers.keys());

        let headers_layer = (!options.headers.is_empty()).then(|| {
            let headers = options
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            let mut layer = Configuration::new();
            layer.insert("headers".into(), Value::Object(headers));
            layer
        });

        let call_layer = config::merge([
            Some(global),
            options.config.as_ref(),
            options.configuration.as_ref(),
            headers_layer.as_ref(),
        ]);

        Ok(Self {
            method,
            path: path.to_string(),
            body,
            inject_content_type,
            query,
            version,
            call_layer,
        })
    }

    /// Resolves the request for one server. `overrides` is the per-call entry for
    /// this server, which outranks the server's stored configuration.
    ///
    /// An injected `Content-Type: application/json` replaces one coming from the
    /// global or per-call configuration, but not one set by the server's stored
    /// configuration or its override.
    pub fn build(
        &self,
        server: &str,
        descriptor: &ServerDescriptor,
        overrides: Option<&Configuration>,
    ) -> std::result::Result<RequestSpec, BuildError> {
        let raw_url = format!("{}{}", descriptor.uri, self.path);
        let mut url = Url::parse(&raw_url).map_err(|source| BuildError::InvalidUri {
            uri: raw_url.clone(),
            source,
        })?;

        if let Some(query) = &self.query {
            url.set_query((!query.is_empty()).then_some(query.as_str()));
        }

        let configuration = config::merge([
            Some(&self.call_layer),
            descriptor.configuration(),
            overrides,
        ]);
        let settings = ClientSettings::from_configuration(&configuration)?;

        let mut headers = settings.headers.clone();
        if self.inject_content_type
            && !sets_content_type(descriptor.configuration())
            && !sets_content_type(overrides)
        {
            headers.retain(|name, _| !name.eq_ignore_ascii_case(CONTENT_TYPE));
            headers.insert(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());
        }
        for (name, value) in &headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err()
                || HeaderValue::from_str(value).is_err()
            {
                return Err(BuildError::InvalidHeader(name.clone()));
            }
        }

        Ok(RequestSpec {
            server: server.to_string(),
            method: self.method.clone(),
            url,
            headers,
            body: self.body.clone(),
            version: self.version,
            settings,
            configuration,
        })
    }
}

fn has_content_type<'a>(mut names: impl Iterator<Item = &'a String>) -> bool {
    names.any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE))
}

fn sets_content_type(layer: Option<&Configuration>) -> bool {
    layer
        .and_then(|conf| conf.get("headers"))
        .and_then(Value::as_object)
        .is_some_and(|headers| has_content_type(headers.keys()))
}

pub fn parse_version(version: &str) -> Result<Version> {
    match version {
        "1.0" => Ok(Version::HTTP_10),
        "1.1" => Ok(Version::HTTP_11),
        "2" | "2.0" => Ok(Version::HTTP_2),
        other => Err(Error::InvalidVersion(other.to_string())),
    }
}

fn encode_query(query: &Map<String, Value>) -> Result<String> {
    let mut pairs = Vec::with_capacity(query.len());
    for (key, value) in query {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(v) = query_scalar(key, item)? {
                        pairs.push((key.clone(), v));
                    }
                }
            }
            other => {
                if let Some(v) = query_scalar(key, other)? {
                    pairs.push((key.clone(), v));
                }
            }
        }
    }
    let encoded: Vec<String> = pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_COMPONENT),
                utf8_percent_encode(v, QUERY_COMPONENT)
            )
        })
        .collect();
    Ok(encoded.join("&"))
}

fn query_scalar(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(if *b { "1" } else { "0" }.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(Error::InvalidQuery(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_configuration;
    use crate::registry::ServerOptions;
    use serde_json::json;

    fn conf(value: Value) -> Configuration {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn descriptor(uri: &str, configuration: Option<Configuration>) -> ServerDescriptor {
        ServerDescriptor {
            uri: uri.to_string(),
            options: ServerOptions { configuration },
        }
    }

    fn template(options: &RequestOptions) -> RequestTemplate {
        RequestTemplate::new(Method::POST, "/test.php", options, &default_configuration()).unwrap()
    }

    #[test]
    fn structured_body_is_encoded_with_json_content_type() {
        let options = RequestOptions::new().with_body(json!({"key1": "value1"}));
        let spec = template(&options)
            .build("a", &descriptor("http://127.0.0.1:1349", None), None)
            .unwrap();

        assert_eq!(spec.body.as_deref(), Some(r#"{"key1":"value1"}"#));
        assert_eq!(spec.headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(spec.url.as_str(), "http://127.0.0.1:1349/test.php");
        assert_eq!(spec.version, Version::HTTP_11);
    }

    #[test]
    fn raw_body_is_sent_verbatim_without_content_type() {
        let options = RequestOptions::new().with_body("key1=value1");
        let spec = template(&options)
            .build("a", &descriptor("http://h", None), None)
            .unwrap();

        assert_eq!(spec.body.as_deref(), Some("key1=value1"));
        assert!(!spec.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let options = RequestOptions::new()
            .with_header("content-type", "application/vnd.api+json")
            .with_body(json!([1, 2]));
        let spec = template(&options)
            .build("a", &descriptor("http://h", None), None)
            .unwrap();

        assert_eq!(spec.headers["content-type"], "application/vnd.api+json");
        assert!(!spec.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn scalar_bodies_are_sent_as_text() {
        let cases = [
            (json!(42), Some("42")),
            (json!(true), Some("true")),
            (json!(null), None),
        ];
        for (body, sent) in cases {
            let options: RequestOptions = serde_json::from_value(json!({"body": body})).unwrap();
            let spec = template(&options)
                .build("a", &descriptor("http://h", None), None)
                .unwrap();

            assert_eq!(spec.body.as_deref(), sent);
            assert!(!spec.headers.contains_key(CONTENT_TYPE));
        }

        let options = RequestOptions::new().with_body(json!(1.5));
        assert_eq!(options.body, Some(Body::Raw("1.5".into())));
        let options = RequestOptions::new().with_json(&7).unwrap();
        assert_eq!(options.body, Some(Body::Raw("7".into())));
    }

    #[test]
    fn json_content_type_beats_configured_defaults_only() {
        let global = conf(json!({"headers": {"content-type": "text/plain"}}));
        let options = RequestOptions::new()
            .with_config(conf(json!({"headers": {"Content-Type": "text/csv"}})))
            .with_body(json!({"a": 1}));
        let tpl = RequestTemplate::new(Method::POST, "/", &options, &global).unwrap();

        let spec = tpl.build("a", &descriptor("http://h", None), None).unwrap();
        assert_eq!(spec.headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert!(!spec.headers.contains_key("content-type"));

        let stored = descriptor(
            "http://h",
            Some(conf(json!({"headers": {"Content-Type": "application/x-ndjson"}}))),
        );
        let spec = tpl.build("a", &stored, None).unwrap();
        assert_eq!(spec.headers[CONTENT_TYPE], "application/x-ndjson");

        let plain = template(&RequestOptions::new().with_body(json!({"a": 1})));
        let overrides = conf(json!({"headers": {"content-type": "text/xml"}}));
        let spec = plain
            .build("a", &descriptor("http://h", None), Some(&overrides))
            .unwrap();
        assert_eq!(spec.headers["content-type"], "text/xml");
        assert!(!spec.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn query_uses_rfc3986_escaping() {
        let options = RequestOptions::new().with_query(conf(json!({
            "q": "two words",
            "op": "a+b&c=d",
            "safe": "x-y_z.~",
        })));
        let tpl =
            RequestTemplate::new(Method::GET, "/", &options, &Configuration::new()).unwrap();
        let spec = tpl.build("a", &descriptor("http://h", None), None).unwrap();

        assert_eq!(
            spec.url.query(),
            Some("q=two%20words&op=a%2Bb%26c%3Dd&safe=x-y_z.~")
        );
    }

    #[test]
    fn empty_query_clears_existing_query_component() {
        let options = RequestOptions::new().with_query(Configuration::new());
        let tpl = RequestTemplate::new(Method::GET, "/p?old=1", &options, &Configuration::new())
            .unwrap();
        let spec = tpl.build("a", &descriptor("http://h", None), None).unwrap();
        assert_eq!(spec.url.query(), None);
    }

    #[test]
    fn query_replaces_existing_query_component() {
        let options = RequestOptions::new().with_query(conf(json!({
            "key1": "value1",
            "tags": ["a", "b"],
            "flag": true,
            "skip": null,
        })));
        let tpl = RequestTemplate::new(Method::GET, "/p?old=1", &options, &Configuration::new())
            .unwrap();
        let spec = tpl.build("a", &descriptor("http://h", None), None).unwrap();

        assert_eq!(spec.url.query(), Some("key1=value1&tags=a&tags=b&flag=1"));
    }

    #[test]
    fn nested_query_objects_are_rejected() {
        let options = RequestOptions::new().with_query(conf(json!({"a": {"b": 1}})));
        let err =
            RequestTemplate::new(Method::GET, "/", &options, &Configuration::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(key) if key == "a"));
    }

    #[test]
    fn unsupported_version_is_a_caller_error() {
        let options = RequestOptions::new().with_version("3");
        let err =
            RequestTemplate::new(Method::GET, "/", &options, &Configuration::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(_)));
        assert_eq!(parse_version("2.0").unwrap(), Version::HTTP_2);
    }

    #[test]
    fn header_precedence_follows_layers() {
        let global = conf(json!({"headers": {"User-Agent": "global", "Accept": "g"}}));
        let options = RequestOptions::new()
            .with_config(conf(json!({"headers": {"X-Layer": "config"}})))
            .with_configuration(conf(json!({"headers": {"X-Layer": "configuration"}})))
            .with_header("User-Agent", "call");
        let tpl = RequestTemplate::new(Method::GET, "/", &options, &global).unwrap();

        let plain = tpl.build("a", &descriptor("http://h", None), None).unwrap();
        assert_eq!(plain.headers["User-Agent"], "call");
        assert_eq!(plain.headers["X-Layer"], "configuration");
        assert_eq!(plain.headers["Accept"], "g");

        let stored = descriptor(
            "http://h",
            Some(conf(json!({"headers": {"User-Agent": "stored"}}))),
        );
        let spec = tpl.build("a", &stored, None).unwrap();
        assert_eq!(spec.headers["User-Agent"], "stored");

        let overrides = conf(json!({"headers": {"User-Agent": "override"}}));
        let spec = tpl.build("a", &stored, Some(&overrides)).unwrap();
        assert_eq!(spec.headers["User-Agent"], "override");
        assert_eq!(spec.headers["Accept"], "g");
    }

    #[test]
    fn per_target_failures_are_build_errors() {
        let tpl = template(&RequestOptions::new());

        let bad_uri = tpl.build("a", &descriptor("not a uri", None), None);
        assert!(matches!(bad_uri, Err(BuildError::InvalidUri { .. })));

        let bad_conf = descriptor("http://h", Some(conf(json!({"timeout": "never"}))));
        assert!(matches!(
            tpl.build("a", &bad_conf, None),
            Err(BuildError::InvalidConfiguration(_))
        ));

        let bad_header = conf(json!({"headers": {"Bad Header": "x"}}));
        assert!(matches!(
            tpl.build("a", &descriptor("http://h", None), Some(&bad_header)),
            Err(BuildError::InvalidHeader(name)) if name == "Bad Header"
        ));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RequestOptions = serde_json::from_value(json!({
            "body": {"name": "test"},
            "return_stats": true,
        }))
        .unwrap();

        assert!(options.return_body);
        assert!(options.return_json);
        assert!(options.return_stats);
        assert_eq!(options.body, Some(Body::Json(json!({"name": "test"}))));

        let raw: RequestOptions = serde_json::from_value(json!({"body": "plain"})).unwrap();
        assert_eq!(raw.body, Some(Body::Raw("plain".into())));
    }
}
