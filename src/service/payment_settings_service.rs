use std::sync::Arc;

use crate::domain::{strip_html, PaymentSettings, PaymentSettingsUpdate, MAX_ANNUAL_FEE_AMOUNT};
use crate::error::{Result, SettingsError};
use crate::repository::PaymentSettingsRepository;

/// Reads fall back to in-memory defaults; writes are merge-then-validate,
/// so a patch is judged against the full row it would produce, and nothing
/// is persisted when validation fails.
pub struct PaymentSettingsService {
    settings: Arc<dyn PaymentSettingsRepository>,
}

impl PaymentSettingsService {
    pub fn new(settings: Arc<dyn PaymentSettingsRepository>) -> Self {
        Self { settings }
    }

    pub async fn get_settings(&self, tenant_id: &str) -> Result<PaymentSettings> {
        if tenant_id.trim().is_empty() {
            return Err(SettingsError::TenantRequired.into());
        }

        match self.settings.find_by_tenant_id(tenant_id).await? {
            Some(settings) => Ok(settings),
            None => Ok(PaymentSettings::defaults(tenant_id)),
        }
    }

    pub async fn update_settings(
        &self,
        tenant_id: &str,
        mut patch: PaymentSettingsUpdate,
    ) -> Result<PaymentSettings> {
        if tenant_id.trim().is_empty() {
            return Err(SettingsError::TenantRequired.into());
        }

        if let Some(Some(description)) = &patch.annual_fee_description {
            let cleaned = strip_html(description);
            patch.annual_fee_description = if cleaned.is_empty() {
                Some(None)
            } else {
                Some(Some(cleaned))
            };
        }

        let current = self.settings.find_by_tenant_id(tenant_id).await?;
        let merged = PaymentSettings::merged(current.as_ref(), tenant_id, &patch);

        validate_settings(&merged)?;

        let saved = self.settings.upsert(merged).await?;
        tracing::info!("Payment settings updated for tenant {}", tenant_id);
        Ok(saved)
    }
}

fn validate_settings(settings: &PaymentSettings) -> std::result::Result<(), SettingsError> {
    if settings.annual_fee_amount < 0 {
        return Err(SettingsError::NegativeAnnualFee);
    }
    if settings.annual_fee_amount > MAX_ANNUAL_FEE_AMOUNT {
        return Err(SettingsError::AnnualFeeTooLarge(MAX_ANNUAL_FEE_AMOUNT));
    }
    if settings.donation_min_amount <= 0 {
        return Err(SettingsError::NonPositiveDonationMin);
    }
    if settings.donation_min_amount > settings.donation_max_amount {
        return Err(SettingsError::MinAboveMax);
    }
    for &preset in &settings.donation_presets {
        if preset < settings.donation_min_amount || preset > settings.donation_max_amount {
            return Err(SettingsError::PresetOutOfRange {
                preset,
                min: settings.donation_min_amount,
                max: settings.donation_max_amount,
            });
        }
    }
    Ok(())
}
