//! Forwarding to the upstream school application.
//!
//! Every request the gate lets through ends up here. The request is replayed
//! against `UPSTREAM_URL` with the same method, path, query and headers.
//! Bodies are streamed in both directions.

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Uri},
    response::Response,
};
use url::Url;

use crate::{
    errors::{AppError, AppResult},
    state::AppState,
};

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub async fn forward(State(state): State<AppState>, req: Request) -> AppResult<Response> {
    let (parts, body) = req.into_parts();

    let url = upstream_target(&state.config.upstream_url, &parts.uri).ok_or_else(|| {
        tracing::warn!(uri = %parts.uri, "request path does not survive upstream URL parsing");
        AppError::BadRequest("Invalid request path".into())
    })?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    if let Some(host) = headers.remove(header::HOST) {
        if !headers.contains_key("x-forwarded-host") {
            headers.insert(HeaderName::from_static("x-forwarded-host"), host);
        }
    }
    tracing::debug!(method = %parts.method, %url, "forwarding upstream");

    let mut request = state.upstream.request(parts.method, url).headers(headers);
    // Bodyless requests stay bodyless rather than going out chunked.
    if body.size_hint().exact() != Some(0) {
        request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    let upstream = request
        .send()
        .await
        .map_err(|e| AppError::BadGateway(e.into()))?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Upstream URL for `uri`, provided parsing leaves the path exactly as the
/// gate evaluated it.
fn upstream_target(upstream: &str, uri: &Uri) -> Option<Url> {
    let base = Url::parse(upstream).ok()?;
    let expected = format!("{}{}", base.path().trim_end_matches('/'), uri.path());

    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let target = Url::parse(&format!("{upstream}{path_and_query}")).ok()?;
    (target.path() == expected).then_some(target)
}

fn strip_hop_by_hop(headers: &mut HeaderMap<HeaderValue>) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}
