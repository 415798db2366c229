//! Per-route CORS layers.

use std::time::Duration;

use axum::extract::Request;
use axum::handler::Handler;
use axum::http::header::ACCESS_CONTROL_REQUEST_METHOD;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer, ExposeHeaders};
use triage_core::error::LoadError;

use crate::descriptor::CorsOptions;

/// Methods allowed when a route enables CORS without listing them.
pub const DEFAULT_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::PUT,
    Method::PATCH,
    Method::POST,
    Method::DELETE,
];

/// Build the CORS layer for one route.
///
/// Fails when an option cannot be expressed as a header value, or when
/// credentials are combined with a wildcard origin.
pub fn build_cors_layer(options: &CorsOptions, origin: &str) -> Result<CorsLayer, LoadError> {
    let invalid = |reason: String| LoadError::InvalidCors {
        origin: origin.to_string(),
        reason,
    };

    let wildcard = options.origin.is_empty() || options.origin.iter().any(|o| o == "*");
    if options.credentials && wildcard {
        return Err(invalid(
            "credentials cannot be allowed for a wildcard origin".into(),
        ));
    }

    let allow_origin = match options.origin.as_slice() {
        _ if wildcard => AllowOrigin::any(),
        [one] => AllowOrigin::exact(
            HeaderValue::from_str(one).map_err(|e| invalid(format!("origin `{one}`: {e}")))?,
        ),
        many => AllowOrigin::list(
            many.iter()
                .map(|o| {
                    HeaderValue::from_str(o).map_err(|e| invalid(format!("origin `{o}`: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };

    let methods = if options.methods.is_empty() {
        DEFAULT_METHODS.to_vec()
    } else {
        options
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|e| invalid(format!("method `{m}`: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let allow_headers = if options.allowed_headers.is_empty() {
        AllowHeaders::mirror_request()
    } else {
        AllowHeaders::list(header_names(&options.allowed_headers, &invalid)?)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(allow_headers)
        .allow_credentials(options.credentials);

    if !options.exposed_headers.is_empty() {
        layer = layer.expose_headers(ExposeHeaders::list(header_names(
            &options.exposed_headers,
            &invalid,
        )?));
    }
    if let Some(secs) = options.max_age_secs {
        layer = layer.max_age(Duration::from_secs(secs));
    }
    Ok(layer)
}

fn header_names(
    names: &[String],
    invalid: &impl Fn(String) -> LoadError,
) -> Result<Vec<HeaderName>, LoadError> {
    names
        .iter()
        .map(|h| {
            HeaderName::from_bytes(h.as_bytes()).map_err(|e| invalid(format!("header `{h}`: {e}")))
        })
        .collect()
}

/// An `OPTIONS` request announcing the method it intends to use.
pub fn is_preflight(req: &Request) -> bool {
    req.method() == Method::OPTIONS && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

/// Answer a preflight through `cors`. A successful answer is `204 No Content`.
pub async fn answer_preflight(cors: CorsLayer, req: Request) -> Response {
    let responder = Handler::<_, ()>::layer(no_content, cors);
    let mut response = Handler::<_, ()>::call(responder, req, ()).await;
    if response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}
