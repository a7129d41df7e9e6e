use axum::{
    http::{header, HeaderValue, Method},
    middleware, Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    gate::{USER_ID_HEADER, USER_ROLE_HEADER},
    middleware::gate_guard::authorize,
    state::AppState,
};

pub mod health;
pub mod proxy;

/// Build the gate service.
///
/// Everything except the health probe is routed through [`authorize`] and
/// then forwarded upstream by [`proxy::forward`].
pub fn app(state: AppState) -> Router {
    app_with(state, Router::new().fallback(proxy::forward))
}

/// Mount `downstream` behind the gate instead of the upstream proxy.
pub fn app_with(state: AppState, downstream: Router<AppState>) -> Router {
    let gate_mw = middleware::from_fn_with_state(state.clone(), authorize);
    let cors = cors_layer(&state.config);

    downstream
        .layer(gate_mw)
        .merge(health::router())
        .layer(CookieManagerLayer::new())   // the gate reads `Cookies`
        .layer(cors)                        // answers preflights before the gate
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(HeaderValue::from_str(&config.app_base_url).ok()))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            USER_ID_HEADER,
            USER_ROLE_HEADER,
        ])
        .allow_credentials(true)
}
