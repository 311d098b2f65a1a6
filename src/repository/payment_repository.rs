use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentStatus, PaymentType},
    error::{AppError, Result},
    payments::stats::{CompletedPayment, DonorSummary, PaymentStats, TypeTotal},
    repository::PaymentRepository,
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    tenant_id: String,
    stripe_session_id: String,
    stripe_payment_intent_id: Option<String>,
    payment_type: String,
    amount: i64,
    currency: String,
    status: String,
    payer_email: Option<String>,
    payer_name: Option<String>,
    is_anonymous: bool,
    description: Option<String>,
    event_id: Option<String>,
    metadata: String,
    completed_at: Option<NaiveDateTime>,
    refunded_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = r#"
    id, tenant_id, stripe_session_id, stripe_payment_intent_id,
    payment_type, amount, currency, status, payer_email, payer_name,
    is_anonymous, description, event_id, metadata,
    completed_at, refunded_at, created_at, updated_at
"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            tenant_id: row.tenant_id,
            stripe_session_id: row.stripe_session_id,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            payment_type: PaymentType::parse(&row.payment_type).ok_or_else(|| {
                AppError::Database(format!("Invalid payment type: {}", row.payment_type))
            })?,
            amount: row.amount,
            currency: row.currency,
            status: PaymentStatus::parse(&row.status).ok_or_else(|| {
                AppError::Database(format!("Invalid payment status: {}", row.status))
            })?,
            payer_email: row.payer_email,
            payer_name: row.payer_name,
            is_anonymous: row.is_anonymous,
            description: row.description,
            event_id: row.event_id,
            metadata: serde_json::from_str(&row.metadata)
                .map_err(|e| AppError::Database(format!("Invalid payment metadata: {}", e)))?,
            completed_at: row
                .completed_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            refunded_at: row
                .refunded_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn fetch_optional(&self, sql: &str, key: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: Payment) -> Result<Payment> {
        let id_str = payment.id.to_string();
        let metadata_str = payment.metadata.to_string();
        let completed_at_naive = payment.completed_at.map(|dt| dt.naive_utc());
        let refunded_at_naive = payment.refunded_at.map(|dt| dt.naive_utc());
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, tenant_id, stripe_session_id, stripe_payment_intent_id,
                payment_type, amount, currency, status, payer_email, payer_name,
                is_anonymous, description, event_id, metadata,
                completed_at, refunded_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&payment.tenant_id)
        .bind(&payment.stripe_session_id)
        .bind(&payment.stripe_payment_intent_id)
        .bind(payment.payment_type.as_str())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.payer_email)
        .bind(&payment.payer_name)
        .bind(payment.is_anonymous)
        .bind(&payment.description)
        .bind(&payment.event_id)
        .bind(&metadata_str)
        .bind(completed_at_naive)
        .bind(refunded_at_naive)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(payment.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?", SELECT_COLUMNS);
        self.fetch_optional(&sql, &id.to_string()).await
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE stripe_session_id = ?",
            SELECT_COLUMNS
        );
        self.fetch_optional(&sql, session_id).await
    }

    async fn find_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE stripe_payment_intent_id = ?",
            SELECT_COLUMNS
        );
        self.fetch_optional(&sql, payment_intent_id).await
    }

    async fn complete_by_session_id(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
        payer_email: Option<&str>,
        payer_name: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'COMPLETED',
                stripe_payment_intent_id = COALESCE(?, stripe_payment_intent_id),
                payer_email = COALESCE(?, payer_email),
                payer_name = COALESCE(?, payer_name),
                completed_at = ?,
                updated_at = ?
            WHERE stripe_session_id = ?
              AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(payment_intent_id)
        .bind(payer_email)
        .bind(payer_name)
        .bind(completed_at.naive_utc())
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_processing_by_session_id(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
        payer_email: Option<&str>,
        payer_name: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'PROCESSING',
                stripe_payment_intent_id = COALESCE(?, stripe_payment_intent_id),
                payer_email = COALESCE(?, payer_email),
                payer_name = COALESCE(?, payer_name),
                updated_at = ?
            WHERE stripe_session_id = ?
              AND status = 'PENDING'
            "#,
        )
        .bind(payment_intent_id)
        .bind(payer_email)
        .bind(payer_name)
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_by_session_id(&self, session_id: &str) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'EXPIRED', updated_at = ?
            WHERE stripe_session_id = ?
              AND status = 'PENDING'
            "#,
        )
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn refund_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
        fully_refunded: bool,
        refunded_at: DateTime<Utc>,
    ) -> Result<bool> {
        // Full refunds only apply to COMPLETED payments; partial refunds may
        // recur while the payment sits in PARTIALLY_REFUNDED.
        let sql = if fully_refunded {
            r#"
            UPDATE payments
            SET status = 'REFUNDED', refunded_at = ?, updated_at = ?
            WHERE stripe_payment_intent_id = ?
              AND status = 'COMPLETED'
            "#
        } else {
            r#"
            UPDATE payments
            SET status = 'PARTIALLY_REFUNDED', refunded_at = ?, updated_at = ?
            WHERE stripe_payment_intent_id = ?
              AND status IN ('COMPLETED', 'PARTIALLY_REFUNDED')
            "#
        };

        let now = Utc::now().naive_utc();
        let result = sqlx::query(sql)
            .bind(refunded_at.naive_utc())
            .bind(now)
            .bind(payment_intent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'FAILED', metadata = ?, updated_at = ?
            WHERE stripe_payment_intent_id = ?
              AND status = 'PROCESSING'
            "#,
        )
        .bind(metadata.to_string())
        .bind(now)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn aggregate_stats(
        &self,
        tenant_id: &str,
        status: PaymentStatus,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<PaymentStats> {
        let start_naive = start.map(|dt| dt.naive_utc());
        let end_naive = end.map(|dt| dt.naive_utc());

        let (total_amount, total_count, average_amount) =
            sqlx::query_as::<_, (i64, i64, f64)>(
                r#"
                SELECT COALESCE(SUM(amount), 0),
                       COUNT(id),
                       COALESCE(AVG(amount), 0.0)
                FROM payments
                WHERE tenant_id = ?
                  AND status = ?
                  AND (? IS NULL OR created_at >= ?)
                  AND (? IS NULL OR created_at <= ?)
                "#,
            )
            .bind(tenant_id)
            .bind(status.as_str())
            .bind(start_naive)
            .bind(start_naive)
            .bind(end_naive)
            .bind(end_naive)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(PaymentStats {
            total_amount,
            total_count,
            average_amount,
        })
    }

    async fn list_completed_between(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CompletedPayment>> {
        let rows = sqlx::query_as::<_, (i64, NaiveDateTime)>(
            r#"
            SELECT amount, completed_at
            FROM payments
            WHERE tenant_id = ?
              AND status = 'COMPLETED'
              AND completed_at IS NOT NULL
              AND completed_at >= ?
              AND completed_at <= ?
            "#,
        )
        .bind(tenant_id)
        .bind(start.naive_utc())
        .bind(end.naive_utc())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(amount, completed_at)| CompletedPayment {
                amount,
                completed_at: DateTime::from_naive_utc_and_offset(completed_at, Utc),
            })
            .collect())
    }

    async fn totals_by_type(
        &self,
        tenant_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TypeTotal>> {
        let start_naive = start.map(|dt| dt.naive_utc());
        let end_naive = end.map(|dt| dt.naive_utc());

        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT payment_type, COALESCE(SUM(amount), 0), COUNT(id)
            FROM payments
            WHERE tenant_id = ?
              AND status = 'COMPLETED'
              AND (? IS NULL OR completed_at >= ?)
              AND (? IS NULL OR completed_at <= ?)
            GROUP BY payment_type
            "#,
        )
        .bind(tenant_id)
        .bind(start_naive)
        .bind(start_naive)
        .bind(end_naive)
        .bind(end_naive)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|(type_str, amount, count)| {
                let payment_type = PaymentType::parse(&type_str).ok_or_else(|| {
                    AppError::Database(format!("Invalid payment type: {}", type_str))
                })?;
                Ok(TypeTotal {
                    payment_type,
                    amount,
                    count,
                })
            })
            .collect()
    }

    async fn top_donors(
        &self,
        tenant_id: &str,
        exclude_anonymous: bool,
        limit: i64,
    ) -> Result<Vec<DonorSummary>> {
        let rows = sqlx::query_as::<_, (String, Option<String>, i64, i64)>(
            r#"
            SELECT payer_email, MAX(payer_name), COALESCE(SUM(amount), 0), COUNT(id)
            FROM payments
            WHERE tenant_id = ?
              AND status = 'COMPLETED'
              AND payer_email IS NOT NULL
              AND (? = 0 OR is_anonymous = 0)
            GROUP BY payer_email
            ORDER BY SUM(amount) DESC
            LIMIT ?
            "#,
        )
        .bind(tenant_id)
        .bind(exclude_anonymous)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(email, name, total_amount, count)| DonorSummary {
                email,
                name,
                total_amount,
                count,
            })
            .collect())
    }

    async fn distinct_donor_count(
        &self,
        tenant_id: &str,
        exclude_anonymous: bool,
    ) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(DISTINCT payer_email)
            FROM payments
            WHERE tenant_id = ?
              AND status = 'COMPLETED'
              AND payer_email IS NOT NULL
              AND (? = 0 OR is_anonymous = 0)
            "#,
        )
        .bind(tenant_id)
        .bind(exclude_anonymous)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count)
    }
}
