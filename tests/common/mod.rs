#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use alumnet::{
    domain::{Payment, PaymentStatus, PaymentType, Tenant},
    error::CheckoutError,
    payments::{CheckoutGateway, CreateSessionRequest, CreatedSession, SessionDetails},
    repository::{SqliteTenantRepository, TenantRepository},
};

pub async fn setup_pool() -> SqlitePool {
    // A single connection keeps the in-memory database alive and shared.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub async fn seed_tenant(pool: &SqlitePool, id: &str, name: &str, subdomain: &str) -> Tenant {
    let repo = SqliteTenantRepository::new(pool.clone());
    repo.create(Tenant {
        id: id.to_string(),
        name: name.to_string(),
        subdomain: subdomain.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
    .await
    .expect("seed tenant")
}

/// A PENDING payment row ready for `PaymentRepository::create`.
pub fn pending_payment(tenant_id: &str, session_id: &str, amount: i64) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        tenant_id: tenant_id.to_string(),
        stripe_session_id: session_id.to_string(),
        stripe_payment_intent_id: None,
        payment_type: PaymentType::Donation,
        amount,
        currency: "jpy".to_string(),
        status: PaymentStatus::Pending,
        payer_email: None,
        payer_name: None,
        is_anonymous: false,
        description: None,
        event_id: None,
        metadata: json!({}),
        completed_at: None,
        refunded_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Builds a `stripe-signature` header the reconciler will accept.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// In-memory stand-in for the hosted checkout provider. Records every
/// request and can be told to fail, so checkout tests never hit the network.
pub struct FakeCheckoutGateway {
    pub requests: Mutex<Vec<CreateSessionRequest>>,
    fail: bool,
    counter: AtomicU64,
}

impl FakeCheckoutGateway {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            counter: AtomicU64::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn recorded_requests(&self) -> Vec<CreateSessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutGateway for FakeCheckoutGateway {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, CheckoutError> {
        if self.fail {
            return Err(CheckoutError::Provider);
        }
        self.requests.lock().unwrap().push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedSession {
            id: format!("cs_test_{}", n),
            url: format!("https://checkout.stripe.test/pay/cs_test_{}", n),
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, CheckoutError> {
        Ok(SessionDetails {
            id: session_id.to_string(),
            url: None,
            payment_status: "paid".to_string(),
            amount_total: Some(5000),
        })
    }
}
