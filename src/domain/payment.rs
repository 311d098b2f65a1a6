use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: String,
    pub stripe_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
    pub is_anonymous: bool,
    pub description: Option<String>,
    pub event_id: Option<String>,
    pub metadata: serde_json::Value,
    pub completed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    AnnualFee,
    Donation,
    EventFee,
    Other,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::AnnualFee => "ANNUAL_FEE",
            PaymentType::Donation => "DONATION",
            PaymentType::EventFee => "EVENT_FEE",
            PaymentType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ANNUAL_FEE" => Some(PaymentType::AnnualFee),
            "DONATION" => Some(PaymentType::Donation),
            "EVENT_FEE" => Some(PaymentType::EventFee),
            "OTHER" => Some(PaymentType::Other),
            _ => None,
        }
    }

    /// Display name for the checkout line item, e.g. "Midori Alumni - annual fee".
    pub fn product_name(&self, tenant_name: &str) -> String {
        match self {
            PaymentType::AnnualFee => format!("{} - annual fee", tenant_name),
            PaymentType::Donation => format!("{} - donation", tenant_name),
            PaymentType::EventFee => format!("{} - event fee", tenant_name),
            PaymentType::Other => format!("{} - payment", tenant_name),
        }
    }
}

/// Payment lifecycle. Transitions only move forward; FAILED, EXPIRED and
/// REFUNDED are terminal for webhook purposes. A payment in
/// PARTIALLY_REFUNDED may receive further partial refunds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            "EXPIRED" => Some(PaymentStatus::Expired),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "PARTIALLY_REFUNDED" => Some(PaymentStatus::PartiallyRefunded),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Expired)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Refunded)
                | (Completed, PartiallyRefunded)
                | (PartiallyRefunded, PartiallyRefunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded
        )
    }
}
