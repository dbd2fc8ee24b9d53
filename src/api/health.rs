#![allow(dead_code)]
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::context::CoreContext;
use crate::inverter::FacadeState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    inverter: ComponentHealth,
    forecasts: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self { status: "healthy".to_string(), error: None }
    }

    fn degraded(error: String) -> Self {
        Self { status: "degraded".to_string(), error: Some(error) }
    }

    fn unhealthy(error: String) -> Self {
        Self { status: "unhealthy".to_string(), error: Some(error) }
    }
}

/// GET /health - overall health, combining the inverter facade state and
/// whether the evaluation loop has produced at least one status yet.
pub async fn health_check(State(ctx): State<Arc<CoreContext>>) -> impl IntoResponse {
    let outage = ctx.inverter.get_outage_status().await;
    let inverter_health = match outage.facade_state {
        FacadeState::Healthy => ComponentHealth::healthy(),
        FacadeState::Degraded => ComponentHealth::degraded("inverter degraded, serving cached reads".to_string()),
        FacadeState::Backoff => ComponentHealth::degraded("inverter in retry backoff".to_string()),
        FacadeState::Uninitialized => ComponentHealth::degraded("inverter not yet initialized".to_string()),
        FacadeState::Terminal => ComponentHealth::unhealthy("inverter outage exceeded tolerance".to_string()),
    };

    let forecast_health = match ctx.last_status.read().await.as_ref() {
        Some(_) => ComponentHealth::healthy(),
        None => ComponentHealth::degraded("no successful evaluation tick yet".to_string()),
    };

    let any_unhealthy = inverter_health.status == "unhealthy";
    let all_healthy = inverter_health.status == "healthy" && forecast_health.status == "healthy";

    let status_code = if any_unhealthy { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };

    let response = HealthResponse {
        status: if any_unhealthy {
            "unhealthy".to_string()
        } else if all_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: chrono::Utc::now(),
        checks: HealthChecks { inverter: inverter_health, forecasts: forecast_health },
    };

    (status_code, Json(response))
}

/// GET /health/ready - ready once the inverter facade has completed its
/// first successful write.
pub async fn readiness_check(State(ctx): State<Arc<CoreContext>>) -> impl IntoResponse {
    let outage = ctx.inverter.get_outage_status().await;
    if matches!(outage.facade_state, FacadeState::Terminal) || !outage.initialization_complete {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// GET /health/live - always OK while the process is answering requests.
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_health_healthy() {
        let health = ComponentHealth::healthy();
        assert_eq!(health.status, "healthy");
        assert!(health.error.is_none());
    }

    #[test]
    fn test_component_health_unhealthy() {
        let health = ComponentHealth::unhealthy("boom".to_string());
        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.error, Some("boom".to_string()));
    }
}
