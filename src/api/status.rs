#![allow(dead_code)]
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::response::ApiResponse;
use crate::auth::AuthBearer;
use crate::context::CoreContext;
use crate::domain::TickStatus;
use crate::inverter::OutageStatus;

/// Everything an operator needs to see at a glance: the last decision the
/// engine made, the inverter facade's outage/backoff state, and which
/// upstream providers are currently rate limited.
#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub tick: Option<TickStatus>,
    pub inverter: OutageStatus,
    pub rate_limited_providers: Vec<RateLimitEntry>,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RateLimitEntry {
    pub provider: String,
    pub retry_after: DateTime<Utc>,
}

/// GET /api/v1/status - current tick result, inverter health, rate limits.
pub async fn get_status(State(ctx): State<Arc<CoreContext>>, _auth: AuthBearer) -> Json<ApiResponse<SystemStatus>> {
    let tick = ctx.last_status.read().await.clone();
    let inverter = ctx.inverter.get_outage_status().await;
    let rate_limited_providers = ctx
        .rate_limits
        .get_all()
        .await
        .into_iter()
        .map(|(provider, retry_after)| RateLimitEntry { provider, retry_after })
        .collect();

    Json(ApiResponse::success(SystemStatus {
        tick,
        inverter,
        rate_limited_providers,
        server_time: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_entry_serializes_with_provider_name() {
        let entry = RateLimitEntry { provider: "tibber".to_string(), retry_after: Utc::now() };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["provider"], "tibber");
    }
}
