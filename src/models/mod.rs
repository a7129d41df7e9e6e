use std::{fmt, str::FromStr};

use axum::http::HeaderValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Roles ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Trainer,
    Student,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Trainer, Role::Student];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin   => "admin",
            Role::Trainer => "trainer",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin"   => Ok(Role::Admin),
            "trainer" => Ok(Role::Trainer),
            "student" => Ok(Role::Student),
            other     => Err(UnknownRole(other.to_string())),
        }
    }
}

// ── Identity ─────────────────────────────────────────────────

/// Caller identity established from a verified session token.
///
/// Inserted into request extensions when the gate forwards an API request,
/// alongside the `X-User-Id` / `X-User-Role` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject:        String,
    /// `subject`, already validated as an `X-User-Id` value.
    pub subject_header: HeaderValue,
    pub role:           Role,
    pub email:          Option<String>,
    pub expires_at:     DateTime<Utc>,
}
