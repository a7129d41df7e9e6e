//! Path policy table.
//!
//! Maps URL paths to what the gate requires of the caller: nothing (public),
//! a role from a set (API namespaces), or a login redirect for direct
//! browser hits (page namespaces). Built once at startup and never mutated.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Role;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("policy path `{0}` must start with `/`")]
    RelativePath(String),
    #[error("policy prefix `{0}` is declared more than once")]
    DuplicatePrefix(String),
    #[error("API rule `{0}` allows no roles")]
    EmptyRoleSet(String),
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
}

// ── Patterns ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    #[default]
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPattern {
    pub path:  String,
    #[serde(default)]
    pub match_kind: MatchKind,
}

impl PathPattern {
    pub fn exact(path: &str) -> Self {
        Self { path: path.into(), match_kind: MatchKind::Exact }
    }

    pub fn prefix(path: &str) -> Self {
        Self { path: path.into(), match_kind: MatchKind::Prefix }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.match_kind {
            MatchKind::Exact  => path == self.path,
            MatchKind::Prefix => path.starts_with(&self.path),
        }
    }
}

/// A public route that is only public for one HTTP method, e.g. browsing the
/// course catalog with `GET` while writes stay behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRoute {
    pub method: String,
    #[serde(flatten)]
    pub pattern: PathPattern,
}

impl PublicRoute {
    fn new(method: Method, pattern: PathPattern) -> Self {
        Self { method: method.as_str().to_string(), pattern }
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method.as_str()) && self.pattern.matches(path)
    }
}

// ── Rules ────────────────────────────────────────────────────

/// Role requirement for one API namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRule {
    pub prefix: String,
    pub roles:  Vec<Role>,
    /// Body message sent with the 403 when the caller's role is not allowed.
    pub denial: String,
}

impl ApiRule {
    pub fn allows(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Page namespace whose direct, token-less visits are bounced to a login page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRule {
    pub prefix: String,
    #[serde(default)]
    pub login:  Option<String>,
}

// ── Table ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyTable {
    /// Paths forwarded without looking at the session at all.
    pub public:            Vec<PathPattern>,
    /// Method-scoped exceptions inside the API namespace.
    pub public_api_routes: Vec<PublicRoute>,
    pub api_namespace:     String,
    pub api_rules:         Vec<ApiRule>,
    pub page_rules:        Vec<PageRule>,
    pub fallback_login:    String,
}

impl Default for PolicyTable {
    fn default() -> Self {
        use Role::*;

        Self {
            public: vec![
                PathPattern::exact("/"),
                PathPattern::prefix("/api/auth/"),
                PathPattern::prefix("/api/health"),
                PathPattern::prefix("/api/debug-session"),
                PathPattern::prefix("/api/test-db"),
                PathPattern::prefix("/api/test-session"),
                PathPattern::prefix("/api/test-homepage-ads"),
                PathPattern::prefix("/api/homepage-ads"),
                PathPattern::prefix("/login"),
                PathPattern::prefix("/admin/login"),
                PathPattern::prefix("/trainer/login"),
                PathPattern::prefix("/student/login"),
                PathPattern::prefix("/signup"),
            ],
            public_api_routes: vec![
                PublicRoute::new(Method::GET, PathPattern::prefix("/api/courses")),
                PublicRoute::new(Method::POST, PathPattern::exact("/api/payments/order")),
                PublicRoute::new(Method::POST, PathPattern::exact("/api/payments/verify")),
            ],
            api_namespace: "/api/".into(),
            api_rules: vec![
                ApiRule {
                    prefix: "/api/admin/".into(),
                    roles:  vec![Admin],
                    denial: "Admin access required".into(),
                },
                ApiRule {
                    prefix: "/api/trainer/".into(),
                    roles:  vec![Admin, Trainer],
                    denial: "Trainer access required".into(),
                },
                ApiRule {
                    prefix: "/api/student/".into(),
                    roles:  vec![Admin, Trainer, Student],
                    denial: "Student access required".into(),
                },
            ],
            page_rules: vec![
                PageRule { prefix: "/admin/".into(),   login: Some("/admin/login".into()) },
                PageRule { prefix: "/trainer/".into(), login: Some("/trainer/login".into()) },
                PageRule { prefix: "/student/".into(), login: Some("/student/login".into()) },
            ],
            fallback_login: "/login".into(),
        }
    }
}

impl PolicyTable {
    /// Parse a JSON policy document. Sections left out keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let table: Self = serde_json::from_str(raw)?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut paths = self
            .public
            .iter()
            .map(|p| p.path.as_str())
            .chain(self.public_api_routes.iter().map(|r| r.pattern.path.as_str()))
            .chain(self.api_rules.iter().map(|r| r.prefix.as_str()))
            .chain(self.page_rules.iter().map(|r| r.prefix.as_str()))
            .chain(self.page_rules.iter().filter_map(|r| r.login.as_deref()))
            .chain([self.api_namespace.as_str(), self.fallback_login.as_str()]);

        if let Some(bad) = paths.find(|p| !p.starts_with('/')) {
            return Err(PolicyError::RelativePath(bad.to_string()));
        }

        for route in &self.public_api_routes {
            Method::from_bytes(route.method.as_bytes())
                .map_err(|_| PolicyError::InvalidMethod(route.method.clone()))?;
        }

        if let Some(rule) = self.api_rules.iter().find(|r| r.roles.is_empty()) {
            return Err(PolicyError::EmptyRoleSet(rule.prefix.clone()));
        }

        check_unique(self.api_rules.iter().map(|r| r.prefix.as_str()))?;
        check_unique(self.page_rules.iter().map(|r| r.prefix.as_str()))?;
        Ok(())
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|p| p.matches(path))
    }

    pub fn is_public_api_route(&self, method: &Method, path: &str) -> bool {
        self.public_api_routes.iter().any(|r| r.matches(method, path))
    }

    pub fn is_api(&self, path: &str) -> bool {
        path.starts_with(&self.api_namespace)
    }

    /// Role rule for an API path. `None` means any verified caller may pass.
    pub fn api_rule(&self, path: &str) -> Option<&ApiRule> {
        longest_prefix(&self.api_rules, path, |r| r.prefix.as_str())
    }

    pub fn page_rule(&self, path: &str) -> Option<&PageRule> {
        longest_prefix(&self.page_rules, path, |r| r.prefix.as_str())
    }

    pub fn login_for<'a>(&'a self, rule: &'a PageRule) -> &'a str {
        rule.login.as_deref().unwrap_or(&self.fallback_login)
    }
}

/// Most specific prefix wins; equal lengths resolve to the earliest rule.
fn longest_prefix<'a, T>(rules: &'a [T], path: &str, prefix: impl Fn(&T) -> &str) -> Option<&'a T> {
    let mut best: Option<(&T, usize)> = None;
    for rule in rules {
        let p = prefix(rule);
        if path.starts_with(p) && best.map_or(true, |(_, len)| p.len() > len) {
            best = Some((rule, p.len()));
        }
    }
    best.map(|(rule, _)| rule)
}

fn check_unique<'a>(prefixes: impl Iterator<Item = &'a str>) -> Result<(), PolicyError> {
    let mut seen = std::collections::HashSet::new();
    for p in prefixes {
        if !seen.insert(p) {
            return Err(PolicyError::DuplicatePrefix(p.to_string()));
        }
    }
    Ok(())
}
