//! Authorization gate middleware.
//!
//! Canonicalizes the request path, collects the method, path, headers,
//! cookies and origin into a [`RequestContext`], asks the shared
//! [`Gate`](crate::gate::Gate) for a decision, then either forwards the
//! augmented request or answers with the rejection.

use axum::{
    extract::{Request, State},
    http::{header, uri::PathAndQuery, HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;
use url::Url;

use crate::{
    errors::AppError,
    gate::{Decision, RequestContext},
    state::AppState,
};

/// Middleware: run every request through the gate.
pub async fn authorize(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Response {
    // The gate must judge the same path the upstream will serve.
    match canonical_uri(req.uri()) {
        Some(uri) => {
            if uri != *req.uri() {
                tracing::debug!(raw = %req.uri(), canonical = %uri, "rewrote request path");
                *req.uri_mut() = uri;
            }
        }
        None => {
            tracing::info!(raw = %req.uri(), "rejected unparseable request path");
            return AppError::BadRequest("Invalid request path".into()).into_response();
        }
    }

    let ctx = RequestContext {
        method:  req.method().clone(),
        path:    req.uri().path().to_string(),
        headers: req.headers().clone(),
        cookies: cookies
            .list()
            .into_iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect(),
        origin:  request_origin(req.headers(), req.uri().scheme_str()),
    };

    match state.gate.evaluate(&ctx) {
        Decision::Forward(forward) => {
            if let Some(identity) = &forward.identity {
                tracing::debug!(
                    path = %ctx.path,
                    user_id = %identity.subject,
                    role = %identity.role,
                    "forwarding with identity headers"
                );
            }
            next.run(forward.apply(req)).await
        }
        Decision::Reject(rejection) => {
            let response = rejection.into_response();
            tracing::info!(
                method = %ctx.method,
                path = %ctx.path,
                status = response.status().as_u16(),
                "request rejected by gate"
            );
            response
        }
    }
}

/// Resolve `.` and `..` segments (also percent-encoded) and backslashes the
/// same way `url` does when the upstream request is built.
fn canonical_uri(uri: &Uri) -> Option<Uri> {
    let mut url = Url::parse("http://gate.invalid/").ok()?;
    url.set_path(uri.path());
    url.set_query(uri.query());

    let path_and_query = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

/// `scheme://host` the client addressed, honouring a fronting proxy.
fn request_origin(headers: &HeaderMap, uri_scheme: Option<&str>) -> Option<String> {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let host = first("x-forwarded-host").or_else(|| first(header::HOST.as_str()))?;
    let scheme = first("x-forwarded-proto").or(uri_scheme).unwrap_or("http");

    // Serialized like the referer side: lowercase host, default port dropped.
    let origin = Url::parse(&format!("{scheme}://{host}")).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
