use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionId, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, Currency,
};

use crate::error::CheckoutError;

/// What the checkout flow asks the provider for. Built by the checkout
/// service after all validation has passed.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub product_name: String,
    pub description: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: String,
    pub amount_total: Option<i64>,
}

/// Seam between the checkout flow and the hosted payment provider, so tests
/// can substitute a fake and the Stripe client is injected rather than
/// reached for as a global.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, CheckoutError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, CheckoutError>;
}

pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(api_key),
        }
    }
}

#[async_trait]
impl CheckoutGateway for StripeGateway {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, CheckoutError> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.customer_email = request.customer_email.as_deref();

        // Inline price data; the platform does not maintain Stripe products.
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price_data: Some(stripe::CreateCheckoutSessionLineItemsPriceData {
                currency: currency_from_code(&request.currency),
                unit_amount: Some(request.amount),
                product_data: Some(stripe::CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_name.clone(),
                    description: request.description.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            quantity: Some(1),
            ..Default::default()
        }]);

        params.metadata = Some(request.metadata.clone());

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| {
                tracing::error!("Stripe session creation failed: {}", e);
                CheckoutError::Provider
            })?;

        let url = session.url.ok_or_else(|| {
            tracing::error!("Stripe returned a session without a checkout URL");
            CheckoutError::Provider
        })?;

        Ok(CreatedSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, CheckoutError> {
        let id = CheckoutSessionId::from_str(session_id)
            .map_err(|_| CheckoutError::InvalidSessionId)?;

        let session = CheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| {
                tracing::error!("Stripe session retrieval failed: {}", e);
                CheckoutError::Provider
            })?;

        Ok(SessionDetails {
            id: session.id.to_string(),
            url: session.url,
            payment_status: session.payment_status.to_string(),
            amount_total: session.amount_total,
        })
    }
}

fn currency_from_code(code: &str) -> Currency {
    match code.to_lowercase().as_str() {
        "usd" => Currency::USD,
        "eur" => Currency::EUR,
        // The platform charges in yen; anything unrecognized falls back.
        _ => Currency::JPY,
    }
}
