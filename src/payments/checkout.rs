use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{Payment, PaymentStatus, PaymentType, Tenant};
use crate::error::{CheckoutError, Result};
use crate::payments::amount::{validate_donation_amount, validate_payment_amount, DonationBounds};
use crate::payments::gateway::{CheckoutGateway, CreateSessionRequest, SessionDetails};
use crate::repository::{PaymentRepository, PaymentSettingsRepository, TenantRepository};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub tenant_id: String,
    pub payment_type: PaymentType,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payer_email: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub url: String,
}

/// Orchestrates session creation: validate, call the provider, then record
/// the PENDING row. The provider call happens before the local write so an
/// insert failure leaves an orphaned session at the provider (harmless, it
/// expires) rather than a local row with no session behind it.
pub struct CheckoutService {
    gateway: Arc<dyn CheckoutGateway>,
    payments: Arc<dyn PaymentRepository>,
    tenants: Arc<dyn TenantRepository>,
    settings: Arc<dyn PaymentSettingsRepository>,
}

impl CheckoutService {
    pub fn new(
        gateway: Arc<dyn CheckoutGateway>,
        payments: Arc<dyn PaymentRepository>,
        tenants: Arc<dyn TenantRepository>,
        settings: Arc<dyn PaymentSettingsRepository>,
    ) -> Self {
        Self {
            gateway,
            payments,
            tenants,
            settings,
        }
    }

    pub async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSessionResponse> {
        if request.tenant_id.trim().is_empty() {
            return Err(CheckoutError::MissingField("tenantId").into());
        }
        if request.success_url.trim().is_empty() {
            return Err(CheckoutError::MissingField("successUrl").into());
        }
        if request.cancel_url.trim().is_empty() {
            return Err(CheckoutError::MissingField("cancelUrl").into());
        }

        validate_payment_amount(request.amount)?;

        let tenant = self
            .tenants
            .find_by_id(&request.tenant_id)
            .await?
            .ok_or(CheckoutError::TenantNotFound)?;

        // Tenant donation bounds apply on top of the platform-wide limits,
        // but only once the tenant has actually saved settings.
        if request.payment_type == PaymentType::Donation {
            if let Some(settings) = self.settings.find_by_tenant_id(&tenant.id).await? {
                let bounds = DonationBounds {
                    min_amount: settings.donation_min_amount,
                    max_amount: settings.donation_max_amount,
                    presets: settings.donation_presets.clone(),
                };
                validate_donation_amount(request.amount, &bounds)?;
            }
        }

        let created = self
            .gateway
            .create_session(&self.build_session_request(&request, &tenant))
            .await?;

        let now = Utc::now();
        let payment = self
            .payments
            .create(Payment {
                id: Uuid::new_v4(),
                tenant_id: tenant.id.clone(),
                stripe_session_id: created.id.clone(),
                stripe_payment_intent_id: None,
                payment_type: request.payment_type,
                amount: request.amount,
                currency: "jpy".to_string(),
                status: PaymentStatus::Pending,
                payer_email: request.payer_email.clone(),
                payer_name: None,
                is_anonymous: request.is_anonymous,
                description: request.description.clone(),
                event_id: request.event_id.clone(),
                metadata: json!({}),
                completed_at: None,
                refunded_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(
            "Created checkout session {} for tenant {} ({} yen, {})",
            created.id,
            tenant.id,
            payment.amount,
            payment.payment_type.as_str()
        );

        Ok(CheckoutSessionResponse {
            session_id: created.id,
            url: created.url,
        })
    }

    pub async fn get_checkout_session(&self, session_id: &str) -> Result<SessionDetails> {
        if session_id.trim().is_empty() {
            return Err(CheckoutError::MissingField("sessionId").into());
        }
        Ok(self.gateway.retrieve_session(session_id).await?)
    }

    fn build_session_request(
        &self,
        request: &CreateCheckoutRequest,
        tenant: &Tenant,
    ) -> CreateSessionRequest {
        let mut metadata = HashMap::new();
        metadata.insert("tenantId".to_string(), tenant.id.clone());
        metadata.insert("type".to_string(), request.payment_type.as_str().to_string());
        if let Some(event_id) = &request.event_id {
            metadata.insert("eventId".to_string(), event_id.clone());
        }
        metadata.insert("isAnonymous".to_string(), request.is_anonymous.to_string());

        CreateSessionRequest {
            product_name: request.payment_type.product_name(&tenant.name),
            description: request.description.clone(),
            amount: request.amount,
            currency: "jpy".to_string(),
            // Stripe substitutes the real id at redirect time.
            success_url: format!(
                "{}?session_id={{CHECKOUT_SESSION_ID}}",
                request.success_url
            ),
            cancel_url: request.cancel_url.clone(),
            customer_email: request.payer_email.clone(),
            metadata,
        }
    }
}
