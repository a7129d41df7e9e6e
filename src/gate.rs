//! The authorization gate.
//!
//! [`Gate::evaluate`] is a pure, single-pass decision over one request: it
//! never mutates the request and holds no per-request state, so one `Gate`
//! is shared by every worker. Applying the [`Decision`] to the live request
//! happens in `middleware::gate_guard`.

use std::collections::HashMap;

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request},
    response::{IntoResponse, Redirect, Response},
};
use url::Url;

use crate::{
    auth::token::{TokenError, TokenVerifier},
    config::Config,
    errors::AppError,
    models::Identity,
    policy::PolicyTable,
};

pub const USER_ID_HEADER:   HeaderName = HeaderName::from_static("x-user-id");
pub const USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");

// ── Request context ──────────────────────────────────────────

/// Everything the gate looks at for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method:  Method,
    pub path:    String,
    pub headers: HeaderMap,
    pub cookies: HashMap<String, String>,
    /// `scheme://host[:port]` the request was addressed to, if known.
    pub origin:  Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path:    path.into(),
            headers: HeaderMap::new(),
            cookies: HashMap::new(),
            origin:  None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Raw session credential: the session cookie, else a bearer token.
    fn credential(&self, cookie_name: &str) -> Option<&str> {
        if let Some(value) = self.cookies.get(cookie_name) {
            return Some(value.as_str());
        }
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Whether the `referer` points at this same origin, i.e. the request is
    /// most likely a client-side navigation inside the app.
    ///
    /// The referer is caller-controlled; this is a UX heuristic, not a check.
    fn is_same_origin_navigation(&self) -> bool {
        let Some(origin) = self.origin.as_deref() else {
            return false;
        };
        self.headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Url::parse(v).ok())
            .is_some_and(|referer| referer.origin().ascii_serialization() == origin)
    }
}

// ── Decisions ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Forward(Forward),
    Reject(Rejection),
}

/// Pass the request on, carrying the verified caller when there is one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forward {
    pub identity: Option<Identity>,
}

impl Forward {
    fn anonymous() -> Self {
        Self { identity: None }
    }

    /// Produce the request to hand downstream.
    ///
    /// Identity headers sent by the caller are always dropped; only headers
    /// derived from a verified token survive.
    pub fn apply<B>(self, mut req: Request<B>) -> Request<B> {
        let headers = req.headers_mut();
        headers.remove(USER_ID_HEADER);
        headers.remove(USER_ROLE_HEADER);

        if let Some(identity) = self.identity {
            headers.insert(USER_ID_HEADER, identity.subject_header.clone());
            headers.insert(USER_ROLE_HEADER, HeaderValue::from_static(identity.role.as_str()));
            req.extensions_mut().insert(identity);
        }
        req
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No usable session on an API path.
    Unauthorized,
    /// Verified caller whose role is not allowed on the API path.
    Forbidden { message: String },
    /// Direct browser hit on a protected page without a session.
    Redirect { location: String },
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::Unauthorized          => AppError::Unauthorized.into_response(),
            Rejection::Forbidden { message } => AppError::Forbidden(message).into_response(),
            Rejection::Redirect { location } => Redirect::temporary(&location).into_response(),
        }
    }
}

// ── Gate ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Gate {
    policy:         PolicyTable,
    verifier:       TokenVerifier,
    session_cookie: String,
}

impl Gate {
    pub fn new(policy: PolicyTable, verifier: TokenVerifier, session_cookie: impl Into<String>) -> Self {
        Self { policy, verifier, session_cookie: session_cookie.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.policy.clone(),
            TokenVerifier::new(&config.session_secret),
            config.session_cookie.clone(),
        )
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    fn identify(&self, req: &RequestContext) -> Result<Identity, TokenError> {
        let raw = req.credential(&self.session_cookie).ok_or(TokenError::Missing)?;
        self.verifier.verify(raw)
    }

    pub fn evaluate(&self, req: &RequestContext) -> Decision {
        let path = req.path.as_str();

        // Preflights never carry credentials.
        if req.method == Method::OPTIONS {
            return Decision::Forward(Forward::anonymous());
        }

        if self.policy.is_public(path) {
            tracing::debug!(path, "public path");
            return Decision::Forward(Forward::anonymous());
        }

        if self.policy.is_api(path) {
            return self.evaluate_api(req);
        }

        if let Some(rule) = self.policy.page_rule(path) {
            // Checked first so a valid session never depends on the referer.
            if let Err(reason) = self.identify(req) {
                if !req.is_same_origin_navigation() {
                    let location = self.policy.login_for(rule).to_string();
                    tracing::debug!(path, %reason, %location, "redirecting to login");
                    return Decision::Reject(Rejection::Redirect { location });
                }
                tracing::debug!(path, %reason, "client-side navigation, deferring to client");
            }
            return Decision::Forward(Forward::anonymous());
        }

        Decision::Forward(Forward::anonymous())
    }

    fn evaluate_api(&self, req: &RequestContext) -> Decision {
        let path = req.path.as_str();

        if self.policy.is_public_api_route(&req.method, path) {
            tracing::debug!(path, method = %req.method, "public API route");
            return Decision::Forward(Forward::anonymous());
        }

        let identity = match self.identify(req) {
            Ok(identity) => identity,
            Err(reason) => {
                tracing::debug!(path, %reason, "no usable session for API route");
                return Decision::Reject(Rejection::Unauthorized);
            }
        };

        if let Some(rule) = self.policy.api_rule(path) {
            if !rule.allows(identity.role) {
                tracing::debug!(path, role = %identity.role, required = ?rule.roles, "role not allowed");
                return Decision::Reject(Rejection::Forbidden { message: rule.denial.clone() });
            }
        }

        tracing::debug!(path, user_id = %identity.subject, role = %identity.role, "API access granted");
        Decision::Forward(Forward { identity: Some(identity) })
    }
}
