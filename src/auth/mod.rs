//! Session credentials.
//!
//! Sessions are issued by the school application; the gate only verifies
//! them (see [`token::TokenVerifier`]).

pub mod token;

pub use token::{TokenError, TokenVerifier};
