use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::PaymentSettings,
    error::{AppError, Result},
    repository::PaymentSettingsRepository,
};

#[derive(FromRow)]
struct PaymentSettingsRow {
    tenant_id: String,
    annual_fee_enabled: bool,
    annual_fee_amount: i64,
    annual_fee_description: Option<String>,
    donation_enabled: bool,
    donation_min_amount: i64,
    donation_max_amount: i64,
    donation_presets: String,
    show_donor_list: bool,
    allow_anonymous: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePaymentSettingsRepository {
    pool: SqlitePool,
}

impl SqlitePaymentSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_settings(row: PaymentSettingsRow) -> Result<PaymentSettings> {
        Ok(PaymentSettings {
            tenant_id: row.tenant_id,
            annual_fee_enabled: row.annual_fee_enabled,
            annual_fee_amount: row.annual_fee_amount,
            annual_fee_description: row.annual_fee_description,
            donation_enabled: row.donation_enabled,
            donation_min_amount: row.donation_min_amount,
            donation_max_amount: row.donation_max_amount,
            donation_presets: serde_json::from_str(&row.donation_presets)
                .map_err(|e| AppError::Database(format!("Invalid donation presets: {}", e)))?,
            show_donor_list: row.show_donor_list,
            allow_anonymous: row.allow_anonymous,
            created_at: Some(DateTime::from_naive_utc_and_offset(row.created_at, Utc)),
            updated_at: Some(DateTime::from_naive_utc_and_offset(row.updated_at, Utc)),
        })
    }
}

#[async_trait]
impl PaymentSettingsRepository for SqlitePaymentSettingsRepository {
    async fn find_by_tenant_id(&self, tenant_id: &str) -> Result<Option<PaymentSettings>> {
        let row = sqlx::query_as::<_, PaymentSettingsRow>(
            r#"
            SELECT tenant_id, annual_fee_enabled, annual_fee_amount,
                   annual_fee_description, donation_enabled, donation_min_amount,
                   donation_max_amount, donation_presets, show_donor_list,
                   allow_anonymous, created_at, updated_at
            FROM payment_settings
            WHERE tenant_id = ?
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_settings(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, settings: PaymentSettings) -> Result<PaymentSettings> {
        let presets_str = serde_json::to_string(&settings.donation_presets)
            .map_err(|e| AppError::Database(e.to_string()))?;
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payment_settings (
                tenant_id, annual_fee_enabled, annual_fee_amount,
                annual_fee_description, donation_enabled, donation_min_amount,
                donation_max_amount, donation_presets, show_donor_list,
                allow_anonymous, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id) DO UPDATE SET
                annual_fee_enabled = excluded.annual_fee_enabled,
                annual_fee_amount = excluded.annual_fee_amount,
                annual_fee_description = excluded.annual_fee_description,
                donation_enabled = excluded.donation_enabled,
                donation_min_amount = excluded.donation_min_amount,
                donation_max_amount = excluded.donation_max_amount,
                donation_presets = excluded.donation_presets,
                show_donor_list = excluded.show_donor_list,
                allow_anonymous = excluded.allow_anonymous,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&settings.tenant_id)
        .bind(settings.annual_fee_enabled)
        .bind(settings.annual_fee_amount)
        .bind(&settings.annual_fee_description)
        .bind(settings.donation_enabled)
        .bind(settings.donation_min_amount)
        .bind(settings.donation_max_amount)
        .bind(&presets_str)
        .bind(settings.show_donor_list)
        .bind(settings.allow_anonymous)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_tenant_id(&settings.tenant_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve saved settings".to_string()))
    }
}
