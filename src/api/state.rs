use std::sync::Arc;

use crate::{
    config::Settings,
    payments::{CheckoutService, StatsService, WebhookReconciler},
    repository::TenantRepository,
    service::PaymentSettingsService,
};

/// Checkout and webhook handling are `None` when Stripe is not configured;
/// the affected routes answer 503 instead of panicking at startup.
#[derive(Clone)]
pub struct AppState {
    pub checkout: Option<Arc<CheckoutService>>,
    pub webhooks: Option<Arc<WebhookReconciler>>,
    pub payment_settings: Arc<PaymentSettingsService>,
    pub stats: Arc<StatsService>,
    pub tenants: Arc<dyn TenantRepository>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        checkout: Option<Arc<CheckoutService>>,
        webhooks: Option<Arc<WebhookReconciler>>,
        payment_settings: Arc<PaymentSettingsService>,
        stats: Arc<StatsService>,
        tenants: Arc<dyn TenantRepository>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            checkout,
            webhooks,
            payment_settings,
            stats,
            tenants,
            settings,
        }
    }
}
