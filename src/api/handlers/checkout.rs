use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::{
    api::state::AppState,
    domain::PaymentType,
    error::{AppError, CheckoutError, Result},
    payments::{CheckoutService, CheckoutSessionResponse, CreateCheckoutRequest, SessionDetails},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDto {
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

pub async fn create(
    State(state): State<AppState>,
    Json(dto): Json<CheckoutDto>,
) -> Result<Json<CheckoutSessionResponse>> {
    let checkout = require_checkout(&state)?;

    if dto.tenant_id.trim().is_empty() {
        return Err(CheckoutError::MissingField("tenantId").into());
    }
    let tenant = state
        .tenants
        .find_by_id(&dto.tenant_id)
        .await?
        .ok_or(CheckoutError::TenantNotFound)?;

    // Redirect targets live on the tenant's own subdomain.
    let base = tenant_base_url(&state.settings.server.base_url, &tenant.subdomain);
    let request = CreateCheckoutRequest {
        tenant_id: dto.tenant_id,
        payment_type: dto.payment_type,
        amount: dto.amount,
        description: dto.description,
        payer_email: dto.customer_email,
        event_id: dto.event_id,
        is_anonymous: dto.is_anonymous,
        success_url: format!("{}/payments/success", base),
        cancel_url: format!("{}/payments/cancel", base),
    };

    let response = checkout.create_checkout_session(request).await?;
    Ok(Json(response))
}

pub async fn get(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetails>> {
    let checkout = require_checkout(&state)?;
    let details = checkout.get_checkout_session(&session_id).await?;
    Ok(Json(details))
}

fn require_checkout(state: &AppState) -> Result<Arc<CheckoutService>> {
    state.checkout.clone().ok_or_else(|| {
        AppError::ServiceUnavailable("Payment processing is not configured".to_string())
    })
}

fn tenant_base_url(base_url: &str, subdomain: &str) -> String {
    match base_url.split_once("://") {
        Some((scheme, host)) => format!("{}://{}.{}", scheme, subdomain, host),
        None => format!("{}.{}", subdomain, base_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_base_url_prefixes_subdomain() {
        assert_eq!(
            tenant_base_url("https://alumnet.jp", "midori"),
            "https://midori.alumnet.jp"
        );
        assert_eq!(
            tenant_base_url("http://localhost:8080", "midori"),
            "http://midori.localhost:8080"
        );
    }
}
