use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Payment, PaymentSettings, PaymentStatus, Tenant};
use crate::error::Result;
use crate::payments::stats::{CompletedPayment, DonorSummary, PaymentStats, TypeTotal};

pub mod payment_repository;
pub mod payment_settings_repository;
pub mod tenant_repository;

pub use payment_repository::SqlitePaymentRepository;
pub use payment_settings_repository::SqlitePaymentSettingsRepository;
pub use tenant_repository::SqliteTenantRepository;

/// Payment rows are created by the checkout flow and mutated only through
/// the guarded transition methods below. Each transition is a single
/// conditional update (`... AND status IN (allowed sources)`) so concurrent
/// webhook redeliveries can never move a payment backwards; a `false` return
/// means the guard did not match and the caller should treat the event as a
/// no-op.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Payment>>;
    async fn find_by_payment_intent_id(&self, payment_intent_id: &str)
        -> Result<Option<Payment>>;

    /// PENDING|PROCESSING -> COMPLETED; records the payment reference and
    /// payer details, stamps completed_at.
    async fn complete_by_session_id(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
        payer_email: Option<&str>,
        payer_name: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// PENDING -> PROCESSING (delayed payment methods); records the payment
    /// reference and payer details without stamping completed_at.
    async fn mark_processing_by_session_id(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
        payer_email: Option<&str>,
        payer_name: Option<&str>,
    ) -> Result<bool>;

    /// PENDING -> EXPIRED.
    async fn expire_by_session_id(&self, session_id: &str) -> Result<bool>;

    /// COMPLETED -> REFUNDED (full) or COMPLETED|PARTIALLY_REFUNDED ->
    /// PARTIALLY_REFUNDED; stamps refunded_at either way.
    async fn refund_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
        fully_refunded: bool,
        refunded_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// PROCESSING -> FAILED; replaces metadata with the merged map
    /// the reconciler built from the existing metadata plus failure details.
    async fn fail_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool>;

    async fn aggregate_stats(
        &self,
        tenant_id: &str,
        status: PaymentStatus,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<PaymentStats>;

    async fn list_completed_between(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CompletedPayment>>;

    async fn totals_by_type(
        &self,
        tenant_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TypeTotal>>;

    async fn top_donors(
        &self,
        tenant_id: &str,
        exclude_anonymous: bool,
        limit: i64,
    ) -> Result<Vec<DonorSummary>>;

    async fn distinct_donor_count(&self, tenant_id: &str, exclude_anonymous: bool) -> Result<i64>;
}

#[async_trait]
pub trait PaymentSettingsRepository: Send + Sync {
    async fn find_by_tenant_id(&self, tenant_id: &str) -> Result<Option<PaymentSettings>>;
    /// Insert-or-replace keyed by tenant id. Callers validate the full
    /// merged row before handing it over.
    async fn upsert(&self, settings: PaymentSettings) -> Result<PaymentSettings>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, tenant: Tenant) -> Result<Tenant>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>>;
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>>;
}
