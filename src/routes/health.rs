use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use std::collections::HashMap;
use std::env;

use crate::app::AppState;

#[derive(Serialize)]
struct HealthStatus {
    status: String,
    services: HashMap<String, ServiceStatus>,
    environment: String,
    version: String,
}

#[derive(Serialize, Clone)]
struct ServiceStatus {
    status: String,
    details: Option<String>,
}

/// Always 200; an unreachable store only degrades the status since plans
/// are still served from the local cache.
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let mut health = HealthStatus {
        status: "ok".to_string(),
        services: HashMap::new(),
        environment: env::var("RUST_ENV").unwrap_or("development".to_string()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let store = match state.plan_store.ping().await {
        Ok(()) => ServiceStatus {
            status: "ok".to_string(),
            details: None,
        },
        Err(err) => {
            log::warn!("Health check: plan store unreachable: {}", err);
            ServiceStatus {
                status: "error".to_string(),
                details: Some(err.to_string()),
            }
        }
    };
    if store.status != "ok" {
        health.status = "degraded".to_string();
    }
    health.services.insert("plan_store".to_string(), store);

    health.services.insert(
        "llm".to_string(),
        ServiceStatus {
            status: "ok".to_string(),
            details: Some(state.model.clone()),
        },
    );

    HttpResponse::Ok().json(health)
}
