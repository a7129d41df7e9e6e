//! Shared application state — injected into middleware and handlers via `axum::extract::State`.

use std::{sync::Arc, time::Duration};

use crate::{config::Config, gate::Gate};

/// Application-wide state passed via axum `State<AppState>`.
///
/// Cloned per request: the config and gate sit behind `Arc`, and
/// `reqwest::Client` is itself a handle to a shared connection pool.
#[derive(Clone)]
pub struct AppState {
    pub config:   Arc<Config>,
    pub gate:     Arc<Gate>,
    pub upstream: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let upstream = reqwest::Client::builder()
            // Upstream redirects go back to the browser untouched.
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            gate: Arc::new(Gate::from_config(&config)),
            config: Arc::new(config),
            upstream,
        })
    }
}
