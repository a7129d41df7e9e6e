//! Role-based authorization gate for the academy web platform.
//!
//! The gate sits in front of the school application, verifies the session
//! token on each request, enforces the path policy table and forwards
//! allowed requests upstream with `X-User-Id` / `X-User-Role` attached.

pub mod auth;
pub mod config;
pub mod errors;
pub mod gate;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod state;
