pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Settings,
    payments::{CheckoutService, StatsService, WebhookReconciler},
    repository::TenantRepository,
    service::PaymentSettingsService,
};
use state::AppState;

pub fn create_app(
    checkout: Option<Arc<CheckoutService>>,
    webhooks: Option<Arc<WebhookReconciler>>,
    payment_settings: Arc<PaymentSettingsService>,
    stats: Arc<StatsService>,
    tenants: Arc<dyn TenantRepository>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(checkout, webhooks, payment_settings, stats, tenants, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        // API routes
        .nest("/api", api_routes())
        // Add state to the router
        .with_state(app_state)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::checkout::create))
        .route("/checkout/:session_id", get(handlers::checkout::get))
        // Public webhook endpoint (no auth)
        .route("/payments/webhook/stripe", post(handlers::webhooks::stripe_webhook))
        .route("/payments/stats", get(handlers::stats::stats))
        .route("/payments/stats/donors", get(handlers::stats::donors))
        .route("/payment-settings/:tenant_id", get(handlers::settings::get))
        .route("/payment-settings/:tenant_id", put(handlers::settings::update))
}
