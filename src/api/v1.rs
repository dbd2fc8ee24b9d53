#![allow(dead_code)]
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::api::{control, status};
use crate::config::Config;
use crate::context::CoreContext;

pub fn router(ctx: Arc<CoreContext>, cfg: &Config) -> Router {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/parameters", get(control::get_parameters))
        .route("/mode", post(control::set_mode))
        .route("/charge-rate", post(control::set_charge_rate))
        .route("/always-allow-discharge-limit", post(control::set_always_allow_discharge_limit))
        .route("/max-charging-from-grid-limit", post(control::set_max_charging_from_grid_limit))
        .route("/min-price-difference", post(control::set_min_price_difference))
        .route("/min-price-difference-rel", post(control::set_min_price_difference_rel))
        .route("/production-offset", post(control::set_production_offset))
        .route("/discharge-blocked", post(control::set_discharge_blocked))
        .route("/limit-pv-charge-rate", post(control::set_limit_pv_charge_rate))
        .with_state(ctx)
        .layer(crate::auth::auth_layer(cfg.auth.token.clone()))
        .layer(Extension(crate::auth::AuthToken(cfg.auth.token.clone())))
}
