//! Per-request values handed to pipeline stages and route handlers.
//!
//! A [`RouteRequest`] is built once from the incoming axum request; stages
//! may enrich it (`derived`, a normalized `body`) for the ones after them.
//! A [`RouteResponse`] accumulates what the handler wants sent and becomes
//! the HTTP response when the pipeline finishes without error.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, OriginalUri, Query, RawPathParams};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use serde::Serialize;
use serde_json::map::Entry;
use serde_json::{Map, Value};
use triage_core::error::RouteError;

/// Session key that receives the encoded URL of a request sent to sign-in.
pub const REDIRECT_TO_KEY: &str = "redirectTo";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Handle to the host's session data for one client.
///
/// The host inserts it as a request extension; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value)
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The request as seen by parameter setup, validation, authorization and
/// the handler.
#[derive(Debug)]
pub struct RouteRequest {
    pub method: Method,
    pub uri: Uri,
    /// Original path and query, before any router nesting stripped a prefix.
    url: String,
    pub headers: HeaderMap,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    /// JSON body, `Null` when the request had none.
    pub body: Value,
    /// Values attached by the route's parameter-setup step.
    pub derived: Map<String, Value>,
    pub session: Option<Session>,
    pub extensions: Extensions,
}

impl RouteRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        let url = url_of(&uri);
        let query = query_of(&uri);
        Self {
            method,
            uri,
            url,
            headers: HeaderMap::new(),
            params: HashMap::new(),
            query,
            body: Value::Null,
            derived: Map::new(),
            session: None,
            extensions: Extensions::new(),
        }
    }

    pub(crate) async fn from_parts(mut parts: Parts) -> Self {
        let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(raw) => raw
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };
        let url = match parts.extensions.get::<OriginalUri>() {
            Some(OriginalUri(original)) => url_of(original),
            None => url_of(&parts.uri),
        };
        let session = parts.extensions.get::<Session>().cloned();

        Self {
            query: query_of(&parts.uri),
            method: parts.method,
            uri: parts.uri,
            url,
            headers: parts.headers,
            params,
            body: Value::Null,
            derived: Map::new(),
            session,
            extensions: parts.extensions,
        }
    }

    /// Read and decode the body. JSON content types are parsed strictly,
    /// urlencoded forms become an object of strings (repeated keys collect
    /// into an array); anything else is kept as a UTF-8 string.
    pub(crate) async fn read_body(&mut self, body: Body, limit: usize) -> Result<(), RouteError> {
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| RouteError::validation(format!("failed to read request body: {e}")))?;
        if bytes.is_empty() {
            return Ok(());
        }

        self.body = if self.is_json() {
            serde_json::from_slice(&bytes)
                .map_err(|e| RouteError::validation(format!("invalid JSON body: {e}")))?
        } else if self.is_form() {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
                .map_err(|e| RouteError::validation(format!("invalid form body: {e}")))?;
            Value::Object(form_object(pairs))
        } else {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        };
        Ok(())
    }

    /// Rename path params bound under another route's capture names.
    /// Each pair is `(bound name, declared name)`.
    pub(crate) fn rename_params(&mut self, aliases: &[(String, String)]) {
        let moved: Vec<(String, String)> = aliases
            .iter()
            .filter_map(|(bound, declared)| {
                self.params
                    .remove(bound)
                    .map(|value| (declared.clone(), value))
            })
            .collect();
        self.params.extend(moved);
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    fn is_json(&self) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with(APPLICATION_JSON) || ct.contains("+json"))
    }

    fn is_form(&self) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with(FORM_URLENCODED))
    }
}

fn form_object(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut object = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match object.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
    object
}

fn url_of(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn query_of(uri: &Uri) -> HashMap<String, String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(query)| query)
        .unwrap_or_default()
}

/// What a handler returns on success.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Data rendered into the route's template (or sent as JSON without one).
    Payload(Map<String, Value>),
    /// No data; a template renders with an empty payload.
    Empty,
    /// The handler produced its own response. Nothing else runs.
    Handled,
}

impl Reply {
    /// Serialize `value` into a payload. It must serialize to an object
    /// (or `null`, which becomes [`Reply::Empty`]).
    pub fn payload<T: Serialize>(value: T) -> Result<Self, RouteError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self::Payload(map)),
            Value::Null => Ok(Self::Empty),
            other => Err(RouteError::handler(format!(
                "render payload must be an object, got {other}"
            ))),
        }
    }
}

impl From<Map<String, Value>> for Reply {
    fn from(map: Map<String, Value>) -> Self {
        Self::Payload(map)
    }
}

/// Response under construction for one request.
#[derive(Debug, Default)]
pub struct RouteResponse {
    status: StatusCode,
    headers: HeaderMap,
    locals: Map<String, Value>,
    redirect: Option<(StatusCode, HeaderValue)>,
    body: Option<(HeaderValue, Bytes)>,
}

impl RouteResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Values visible to the template alongside the payload.
    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.locals
    }

    pub fn redirect(&mut self, status: StatusCode, location: &str) -> Result<(), RouteError> {
        let location = HeaderValue::from_str(location)
            .map_err(|e| RouteError::handler(format!("invalid redirect location: {e}")))?;
        self.redirect = Some((status, location));
        Ok(())
    }

    /// True once a redirect was issued, by this type or a raw `Location` header.
    pub fn is_redirected(&self) -> bool {
        self.redirect.is_some() || self.headers.contains_key(LOCATION)
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn send(&mut self, status: StatusCode, body: impl Into<String>) {
        let body: String = body.into();
        self.status = status;
        self.set_body(HeaderValue::from_static(TEXT_PLAIN), Bytes::from(body));
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<(), RouteError> {
        let bytes = serde_json::to_vec(value)?;
        self.set_body(HeaderValue::from_static(APPLICATION_JSON), Bytes::from(bytes));
        Ok(())
    }

    pub fn html(&mut self, body: impl Into<String>) {
        let body: String = body.into();
        self.set_body(HeaderValue::from_static(TEXT_HTML), Bytes::from(body));
    }

    pub(crate) fn set_body(&mut self, content_type: HeaderValue, body: Bytes) {
        self.body = Some((content_type, body));
    }

    pub fn into_http(self) -> Response {
        let mut response = match self.body {
            Some((content_type, bytes)) => {
                let mut response = Response::new(Body::from(bytes));
                response.headers_mut().insert(CONTENT_TYPE, content_type);
                response
            }
            None => Response::new(Body::empty()),
        };
        *response.status_mut() = self.status;

        if let Some((status, location)) = self.redirect {
            *response.status_mut() = status;
            response.headers_mut().insert(LOCATION, location);
        }
        response.headers_mut().extend(self.headers);
        response
    }
}
