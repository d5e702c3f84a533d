use axum::{
    body::{to_bytes, Bytes},
    extract::Request,
    http::{header, HeaderMap, HeaderName},
    response::{IntoResponse, Response},
};

use super::{GatewayState, Upstream};
use crate::error::ApiError;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Client headers that describe the client connection, not the request
const DROPPED_HEADERS: [HeaderName; 6] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::ACCEPT_ENCODING,
    header::COOKIE,
    header::TRANSFER_ENCODING,
];

pub fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = incoming.clone();
    for name in &DROPPED_HEADERS {
        headers.remove(name);
    }
    headers
}

/// Upstream URL for a gateway path: the prefix is swapped for the base URL,
/// the rest of the path and the query string are kept.
pub fn target_url(base: &str, upstream: Upstream, path_and_query: &str) -> String {
    let rest = path_and_query.strip_prefix(upstream.prefix()).unwrap_or(path_and_query);
    format!("{}{}", base.trim_end_matches('/'), rest)
}

/// Relay `request` to `upstream` and pass its status, content type and body
/// back unchanged.
#[tracing::instrument(name = "gateway", skip_all, fields(upstream = upstream.label(), method = %request.method(), path = %request.uri().path()))]
pub async fn forward(gw: &GatewayState, upstream: Upstream, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(parts.uri.path());
    let url = target_url(gw.base_url(upstream), upstream, path_and_query);

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return ApiError::bad_request("Request body too large").into_response(),
    };

    let mut outgoing = gw.client().request(parts.method, url).headers(forwarded_headers(&parts.headers));
    if !body.is_empty() {
        outgoing = outgoing.body(body);
    }

    let no_response = || ApiError::bad_gateway(format!("No response from {} service", upstream.label())).into_response();
    let upstream_response = match outgoing.send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "upstream unreachable");
            return no_response();
        }
    };

    let status = upstream_response.status();
    let content_type = upstream_response.headers().get(header::CONTENT_TYPE).cloned();
    let bytes: Bytes = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "upstream body interrupted");
            return no_response();
        }
    };

    tracing::debug!(status = status.as_u16(), "relayed");
    let mut response = (status, bytes).into_response();
    match content_type {
        Some(value) => {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    response
}
