use crate::error::AmountError;

/// Stripe's minimum charge for JPY.
pub const STRIPE_MIN_AMOUNT_JPY: i64 = 50;
/// Platform ceiling (10 million yen).
pub const MAX_PAYMENT_AMOUNT: i64 = 10_000_000;

/// Currencies whose smallest unit is the standard unit (no cents).
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "jpy", "krw", "vnd", "bif", "clp", "djf", "gnf", "kmf", "mga", "pyg", "rwf", "ugx", "vuv",
    "xaf", "xof", "xpf",
];

/// Validates a payment amount in yen. Amounts arrive as i64, so the
/// whole-number rule is enforced by the type at the HTTP boundary; the
/// remaining rules are checked here in order.
pub fn validate_payment_amount(amount: i64) -> Result<(), AmountError> {
    if amount <= 0 {
        return Err(AmountError::NotPositive);
    }
    if amount < STRIPE_MIN_AMOUNT_JPY {
        return Err(AmountError::BelowMinimum(STRIPE_MIN_AMOUNT_JPY));
    }
    if amount > MAX_PAYMENT_AMOUNT {
        return Err(AmountError::AboveMaximum(MAX_PAYMENT_AMOUNT));
    }
    Ok(())
}

/// Tenant-configured donation bounds. Presets ride along for display; they
/// are validated when settings are written, not here.
#[derive(Debug, Clone)]
pub struct DonationBounds {
    pub min_amount: i64,
    pub max_amount: i64,
    pub presets: Vec<i64>,
}

pub fn validate_donation_amount(amount: i64, bounds: &DonationBounds) -> Result<(), AmountError> {
    validate_payment_amount(amount)?;

    if amount < bounds.min_amount {
        return Err(AmountError::BelowDonationMinimum(bounds.min_amount));
    }
    if amount > bounds.max_amount {
        return Err(AmountError::AboveDonationMaximum(bounds.max_amount));
    }
    Ok(())
}

/// Converts a standard-unit amount to the smallest currency unit Stripe
/// expects. Zero-decimal currencies pass through unchanged.
pub fn format_amount_for_stripe(amount: f64, currency: &str) -> i64 {
    if is_zero_decimal(currency) {
        amount.round() as i64
    } else {
        (amount * 100.0).round() as i64
    }
}

/// Inverse of [`format_amount_for_stripe`].
pub fn format_amount_from_stripe(amount: i64, currency: &str) -> f64 {
    if is_zero_decimal(currency) {
        amount as f64
    } else {
        amount as f64 / 100.0
    }
}

fn is_zero_decimal(currency: &str) -> bool {
    let normalized = currency.to_lowercase();
    ZERO_DECIMAL_CURRENCIES.contains(&normalized.as_str())
}
