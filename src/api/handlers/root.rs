use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Alumnet Payments API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Payment processing core for alumni associations",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "checkout": "/api/checkout",
            "webhook": "/api/payments/webhook/stripe",
            "settings": "/api/payment-settings/:tenant_id",
            "stats": "/api/payments/stats"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
