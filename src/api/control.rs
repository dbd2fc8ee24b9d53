//! External control surface (C7): typed setters over the tunable
//! `Parameters` guarded inside `CoreContext`, plus an explicit mode
//! override that bypasses the decision engine entirely. One handler per
//! field rather than a single blanket PATCH, so each input gets its own
//! validation and its own audit log line.
#![allow(dead_code)]
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::response::ApiResponse;
use crate::auth::AuthBearer;
use crate::context::CoreContext;
use crate::domain::Mode;
use crate::error::ControlError;

async fn update<F>(ctx: &CoreContext, field: &'static str, f: F) -> Result<Json<ApiResponse<()>>, ApiError>
where
    F: FnOnce(&mut crate::domain::Parameters) -> Result<(), String>,
{
    let mut params = ctx.parameters.write().await;
    f(&mut params).map_err(|reason| ApiError::Control(ControlError::InvalidOverride { field: field.to_string(), reason }))?;
    params.repair();
    tracing::info!(field, "control parameter updated");
    Ok(Json(ApiResponse::success(())))
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Option<Mode>,
}

/// POST /mode — forces a mode, bypassing the decision engine; `null`
/// clears the override and returns control to the automatic engine.
pub async fn set_mode(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<ModeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    update(&ctx, "mode_override", |p| {
        p.mode_override = req.mode;
        Ok(())
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct ChargeRateRequest {
    pub charge_rate_w: f64,
}

/// POST /charge-rate — sets the rate used when `mode_override` forces
/// `ForceCharge`.
pub async fn set_charge_rate(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<ChargeRateRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if req.charge_rate_w < 0.0 {
        return Err(ApiError::BadRequest("charge_rate_w must be >= 0".to_string()));
    }
    update(&ctx, "force_charge_rate_w", |p| {
        p.force_charge_rate_w = req.charge_rate_w;
        Ok(())
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct FractionRequest {
    pub value: f64,
}

/// POST /always-allow-discharge-limit — SoC fraction (0.0-1.0) above which
/// discharge is always permitted regardless of price.
pub async fn set_always_allow_discharge_limit(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<FractionRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if !(0.0..=1.0).contains(&req.value) {
        return Err(ApiError::BadRequest("value must be within 0.0..=1.0".to_string()));
    }
    update(&ctx, "always_allow_discharge_limit", |p| {
        p.always_allow_discharge_limit = req.value;
        Ok(())
    })
    .await
}

/// POST /max-charging-from-grid-limit — SoC fraction below which a forced
/// grid charge is allowed to proceed.
pub async fn set_max_charging_from_grid_limit(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<FractionRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if !(0.0..=1.0).contains(&req.value) {
        return Err(ApiError::BadRequest("value must be within 0.0..=1.0".to_string()));
    }
    update(&ctx, "max_charging_from_grid_limit", |p| {
        p.max_charging_from_grid_limit = req.value;
        Ok(())
    })
    .await
}

/// POST /min-price-difference — absolute currency-unit price band width.
pub async fn set_min_price_difference(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<FractionRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if req.value < 0.0 {
        return Err(ApiError::BadRequest("value must be >= 0".to_string()));
    }
    update(&ctx, "min_price_difference", |p| {
        p.min_price_difference = req.value;
        Ok(())
    })
    .await
}

/// POST /min-price-difference-rel — relative (fraction of current price)
/// price band width.
pub async fn set_min_price_difference_rel(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<FractionRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if req.value < 0.0 {
        return Err(ApiError::BadRequest("value must be >= 0".to_string()));
    }
    update(&ctx, "min_price_difference_rel", |p| {
        p.min_price_difference_rel = req.value;
        Ok(())
    })
    .await
}

/// POST /production-offset — percentage multiplier applied to the solar
/// forecast before it enters the decision engine (derating for shading,
/// soiling, inverter clipping, etc).
pub async fn set_production_offset(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<FractionRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if req.value < 0.0 {
        return Err(ApiError::BadRequest("value must be >= 0".to_string()));
    }
    update(&ctx, "production_offset_percent", |p| {
        p.production_offset_percent = req.value;
        Ok(())
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct BoolRequest {
    pub value: bool,
}

/// POST /discharge-blocked — operator kill switch for discharge, honored
/// by the decision engine's §4.5.1 Step D, bypassable only by the
/// always-allow-above-SoC override.
pub async fn set_discharge_blocked(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<BoolRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    update(&ctx, "discharge_blocked", |p| {
        p.discharge_blocked = req.value;
        Ok(())
    })
    .await
}

/// POST /limit-pv-charge-rate — rate applied when `mode_override` forces
/// `LimitPvCharge`.
pub async fn set_limit_pv_charge_rate(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
    Json(req): Json<ChargeRateRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if req.charge_rate_w < 0.0 {
        return Err(ApiError::BadRequest("charge_rate_w must be >= 0".to_string()));
    }
    update(&ctx, "limit_pv_charge_rate_w", |p| {
        p.limit_pv_charge_rate_w = req.charge_rate_w;
        Ok(())
    })
    .await
}

/// GET /parameters — current tunables, for operators to inspect before
/// changing one.
pub async fn get_parameters(
    State(ctx): State<Arc<CoreContext>>,
    _auth: AuthBearer,
) -> Json<ApiResponse<crate::domain::Parameters>> {
    let params = ctx.parameters_snapshot().await;
    Json(ApiResponse::success(params))
}
