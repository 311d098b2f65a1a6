use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::PaymentStatus;
use crate::error::{AppError, Result, WebhookError};
use crate::repository::PaymentRepository;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook signature timestamp, in seconds. Matches
/// Stripe's recommended replay-protection window.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A verified provider event. The object payload stays untyped until the
/// per-event handler knows what shape to expect, so unrecognized event
/// types can flow through without errors.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResult {
    pub handled: bool,
    pub skipped: bool,
    pub event_type: String,
}

impl WebhookResult {
    fn applied(event_type: &str) -> Self {
        Self {
            handled: true,
            skipped: false,
            event_type: event_type.to_string(),
        }
    }

    fn skipped(event_type: &str) -> Self {
        Self {
            handled: true,
            skipped: true,
            event_type: event_type.to_string(),
        }
    }

    fn unhandled(event_type: &str) -> Self {
        Self {
            handled: false,
            skipped: false,
            event_type: event_type.to_string(),
        }
    }
}

// Stripe expands referenced objects inline depending on API settings, so a
// payment_intent field may arrive as "pi_123" or as {"id": "pi_123", ...}.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionPayload {
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_intent: Option<Expandable>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargePayload {
    #[serde(default)]
    payment_intent: Option<Expandable>,
    #[serde(default)]
    refunded: bool,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentPayload {
    id: String,
    #[serde(default)]
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Applies verified provider events to payment rows. Signature verification
/// is the only authentication on the webhook path; every state change goes
/// through a guarded repository transition so redelivered or reordered
/// events degrade to no-ops instead of corrupting rows.
pub struct WebhookReconciler {
    payments: Arc<dyn PaymentRepository>,
    webhook_secret: String,
}

impl WebhookReconciler {
    pub fn new(payments: Arc<dyn PaymentRepository>, webhook_secret: String) -> Self {
        Self {
            payments,
            webhook_secret,
        }
    }

    /// Verifies the `stripe-signature` header against the raw body and
    /// parses the event envelope. Fails closed: no event is ever produced
    /// from an unverified payload.
    pub fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> std::result::Result<WebhookEvent, WebhookError> {
        verify_signature(
            payload,
            signature_header,
            &self.webhook_secret,
            Utc::now().timestamp(),
        )?;

        serde_json::from_slice(payload).map_err(|_| WebhookError::BadPayload)
    }

    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<WebhookResult> {
        match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_session_completed(event).await,
            "checkout.session.expired" => self.handle_session_expired(event).await,
            "charge.refunded" => self.handle_charge_refunded(event).await,
            "payment_intent.payment_failed" => self.handle_payment_failed(event).await,
            other => {
                tracing::debug!("Unhandled webhook event type: {}", other);
                Ok(WebhookResult::unhandled(other))
            }
        }
    }

    async fn handle_session_completed(&self, event: &WebhookEvent) -> Result<WebhookResult> {
        let session: CheckoutSessionPayload = parse_object(event)?;

        let Some(payment) = self.payments.find_by_session_id(&session.id).await? else {
            // The local row may not exist yet (or ever): webhook delivery is
            // not ordered against our own writes.
            tracing::warn!("No payment for checkout session {}, skipping", session.id);
            return Ok(WebhookResult::skipped(&event.event_type));
        };

        if payment.status == PaymentStatus::Completed && payment.completed_at.is_some() {
            tracing::debug!("Session {} already completed, skipping redelivery", session.id);
            return Ok(WebhookResult::skipped(&event.event_type));
        }

        let is_paid = session.payment_status.as_deref() == Some("paid");
        let payment_intent_id = session.payment_intent.as_ref().map(Expandable::id);
        let payer_email = session
            .customer_details
            .as_ref()
            .and_then(|c| c.email.as_deref());
        let payer_name = session
            .customer_details
            .as_ref()
            .and_then(|c| c.name.as_deref());

        let applied = if is_paid {
            self.payments
                .complete_by_session_id(
                    &session.id,
                    payment_intent_id,
                    payer_email,
                    payer_name,
                    Utc::now(),
                )
                .await?
        } else {
            // Delayed payment methods: the money has not moved yet.
            self.payments
                .mark_processing_by_session_id(
                    &session.id,
                    payment_intent_id,
                    payer_email,
                    payer_name,
                )
                .await?
        };

        if applied {
            tracing::info!(
                "Checkout session {} reconciled to {}",
                session.id,
                if is_paid { "COMPLETED" } else { "PROCESSING" }
            );
            Ok(WebhookResult::applied(&event.event_type))
        } else {
            Ok(WebhookResult::skipped(&event.event_type))
        }
    }

    async fn handle_session_expired(&self, event: &WebhookEvent) -> Result<WebhookResult> {
        let session: CheckoutSessionPayload = parse_object(event)?;

        if self.payments.find_by_session_id(&session.id).await?.is_none() {
            return Ok(WebhookResult::skipped(&event.event_type));
        }

        let applied = self.payments.expire_by_session_id(&session.id).await?;
        if applied {
            tracing::info!("Checkout session {} expired", session.id);
            Ok(WebhookResult::applied(&event.event_type))
        } else {
            Ok(WebhookResult::skipped(&event.event_type))
        }
    }

    async fn handle_charge_refunded(&self, event: &WebhookEvent) -> Result<WebhookResult> {
        let charge: ChargePayload = parse_object(event)?;

        let Some(payment_intent_id) = charge.payment_intent.as_ref().map(Expandable::id) else {
            return Ok(WebhookResult::skipped(&event.event_type));
        };

        if self
            .payments
            .find_by_payment_intent_id(payment_intent_id)
            .await?
            .is_none()
        {
            return Ok(WebhookResult::skipped(&event.event_type));
        }

        let applied = self
            .payments
            .refund_by_payment_intent_id(payment_intent_id, charge.refunded, Utc::now())
            .await?;

        if applied {
            tracing::info!(
                "Payment intent {} marked {}",
                payment_intent_id,
                if charge.refunded { "REFUNDED" } else { "PARTIALLY_REFUNDED" }
            );
            Ok(WebhookResult::applied(&event.event_type))
        } else {
            Ok(WebhookResult::skipped(&event.event_type))
        }
    }

    async fn handle_payment_failed(&self, event: &WebhookEvent) -> Result<WebhookResult> {
        let intent: PaymentIntentPayload = parse_object(event)?;

        let Some(payment) = self
            .payments
            .find_by_payment_intent_id(&intent.id)
            .await?
        else {
            return Ok(WebhookResult::skipped(&event.event_type));
        };

        // Merge failure details into the existing metadata map; unrelated
        // keys survive.
        let mut metadata = payment.metadata.clone();
        let (reason, code) = intent
            .last_payment_error
            .map(|e| (e.message, e.code))
            .unwrap_or((None, None));
        match metadata.as_object_mut() {
            Some(map) => {
                map.insert("failureReason".to_string(), json!(reason));
                map.insert("failureCode".to_string(), json!(code));
            }
            None => {
                metadata = json!({ "failureReason": reason, "failureCode": code });
            }
        }

        let applied = self
            .payments
            .fail_by_payment_intent_id(&intent.id, &metadata)
            .await?;

        if applied {
            tracing::warn!("Payment intent {} failed: {:?}", intent.id, metadata);
            Ok(WebhookResult::applied(&event.event_type))
        } else {
            Ok(WebhookResult::skipped(&event.event_type))
        }
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &WebhookEvent) -> Result<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        AppError::BadRequest(format!(
            "Malformed {} event object: {}",
            event.event_type, e
        ))
    })
}

/// Verifies a Stripe-style signature header (`t=<unix>,v1=<hex hmac>`)
/// against the raw payload: HMAC-SHA256 over `"{t}.{payload}"`, compared in
/// constant time, with the timestamp bounded by the replay window.
fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now: i64,
) -> std::result::Result<(), WebhookError> {
    if signature_header.trim().is_empty() {
        return Err(WebhookError::MissingSignature);
    }

    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse().ok();
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
    if candidates.is_empty() {
        return Err(WebhookError::MalformedSignature);
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(WebhookError::StaleTimestamp);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::MalformedSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    for candidate in candidates {
        let Ok(provided) = hex::decode(candidate) else {
            continue;
        };
        if expected.ct_eq(provided.as_slice()).into() {
            return Ok(());
        }
    }

    Err(WebhookError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, SECRET, now);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, "wrong_secret", now);
        assert_eq!(
            verify_signature(payload, &header, SECRET, now),
            Err(WebhookError::BadSignature)
        );
    }

    #[test]
    fn rejects_modified_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let tampered = br#"{"type":"checkout.session.completed","extra":true}"#;
        let now = 1_700_000_000;
        let header = sign(payload, SECRET, now);
        assert_eq!(
            verify_signature(tampered, &header, SECRET, now),
            Err(WebhookError::BadSignature)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let header = sign(payload, SECRET, now - 600);
        assert_eq!(
            verify_signature(payload, &header, SECRET, now),
            Err(WebhookError::StaleTimestamp)
        );
        // A future timestamp beyond tolerance is just as stale.
        let header = sign(payload, SECRET, now + 600);
        assert_eq!(
            verify_signature(payload, &header, SECRET, now),
            Err(WebhookError::StaleTimestamp)
        );
    }

    #[test]
    fn accepts_timestamp_within_tolerance() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let header = sign(payload, SECRET, now - 200);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn rejects_missing_or_garbage_header() {
        let payload = b"{}";
        let now = 1_700_000_000;
        assert_eq!(
            verify_signature(payload, "", SECRET, now),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verify_signature(payload, "   ", SECRET, now),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verify_signature(payload, "not-a-signature", SECRET, now),
            Err(WebhookError::MalformedSignature)
        );
        assert_eq!(
            verify_signature(payload, "v1=deadbeef", SECRET, now),
            Err(WebhookError::MalformedSignature)
        );
        assert_eq!(
            verify_signature(payload, "t=1700000000", SECRET, now),
            Err(WebhookError::MalformedSignature)
        );
    }

    #[test]
    fn accepts_any_matching_v1_candidate() {
        // Secret rotation: Stripe sends one v1 per active secret.
        let payload = b"{}";
        let now = 1_700_000_000;
        let good = sign(payload, SECRET, now);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", now, "00".repeat(32), good_sig);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn expandable_accepts_string_or_object() {
        let from_str: Expandable = serde_json::from_value(json!("pi_123")).unwrap();
        assert_eq!(from_str.id(), "pi_123");

        let from_obj: Expandable =
            serde_json::from_value(json!({"id": "pi_456", "amount": 5000})).unwrap();
        assert_eq!(from_obj.id(), "pi_456");
    }

    #[test]
    fn event_envelope_parses() {
        let raw = br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_1", "payment_status": "paid"}}
        }"#;
        let event: WebhookEvent = serde_json::from_slice(raw).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        let session: CheckoutSessionPayload =
            serde_json::from_value(event.data.object).unwrap();
        assert_eq!(session.id, "cs_1");
        assert_eq!(session.payment_status.as_deref(), Some("paid"));
    }
}
