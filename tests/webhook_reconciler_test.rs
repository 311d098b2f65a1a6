mod common;

use std::sync::Arc;

use serde_json::json;

use alumnet::{
    domain::PaymentStatus,
    payments::{WebhookEvent, WebhookReconciler},
    repository::{PaymentRepository, SqlitePaymentRepository},
};

use common::{pending_payment, seed_tenant, setup_pool};

const SECRET: &str = "whsec_test";

fn event(event_type: &str, object: serde_json::Value) -> WebhookEvent {
    serde_json::from_value(json!({
        "id": "evt_test",
        "type": event_type,
        "data": { "object": object }
    }))
    .expect("event envelope")
}

async fn fixture(pool: &sqlx::SqlitePool) -> (Arc<SqlitePaymentRepository>, WebhookReconciler) {
    seed_tenant(pool, "t1", "Midori Alumni", "midori").await;
    let payments = Arc::new(SqlitePaymentRepository::new(pool.clone()));
    let reconciler = WebhookReconciler::new(payments.clone(), SECRET.to_string());
    (payments, reconciler)
}

fn completed_session(session_id: &str) -> serde_json::Value {
    json!({
        "id": session_id,
        "payment_status": "paid",
        "payment_intent": "pi_1",
        "customer_details": { "email": "donor@example.com", "name": "Hanako Sato" }
    })
}

#[tokio::test]
async fn paid_session_completes_payment() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (payments, reconciler) = fixture(&pool).await;
    payments.create(pending_payment("t1", "cs_1", 5000)).await?;

    let result = reconciler
        .handle_event(&event("checkout.session.completed", completed_session("cs_1")))
        .await?;
    assert!(result.handled);
    assert!(!result.skipped);

    let payment = payments.find_by_session_id("cs_1").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.completed_at.is_some());
    assert_eq!(payment.stripe_payment_intent_id.as_deref(), Some("pi_1"));
    assert_eq!(payment.payer_email.as_deref(), Some("donor@example.com"));
    assert_eq!(payment.payer_name.as_deref(), Some("Hanako Sato"));

    Ok(())
}

#[tokio::test]
async fn redelivered_completion_is_a_noop() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (payments, reconciler) = fixture(&pool).await;
    payments.create(pending_payment("t1", "cs_1", 5000)).await?;

    let evt = event("checkout.session.completed", completed_session("cs_1"));
    reconciler.handle_event(&evt).await?;
    let first = payments.find_by_session_id("cs_1").await?.unwrap();

    let result = reconciler.handle_event(&evt).await?;
    assert!(result.handled);
    assert!(result.skipped);

    let second = payments.find_by_session_id("cs_1").await?.unwrap();
    assert_eq!(second.completed_at, first.completed_at);
    assert_eq!(second.status, PaymentStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn unpaid_session_moves_to_processing() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (payments, reconciler) = fixture(&pool).await;
    payments.create(pending_payment("t1", "cs_1", 5000)).await?;

    let object = json!({
        "id": "cs_1",
        "payment_status": "unpaid",
        "payment_intent": { "id": "pi_1", "amount": 5000 }
    });
    let result = reconciler
        .handle_event(&event("checkout.session.completed", object))
        .await?;
    assert!(result.handled);
    assert!(!result.skipped);

    let payment = payments.find_by_session_id("cs_1").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
    assert_eq!(payment.completed_at, None);
    assert_eq!(payment.stripe_payment_intent_id.as_deref(), Some("pi_1"));

    Ok(())
}

#[tokio::test]
async fn expiry_only_touches_pending_rows() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (payments, reconciler) = fixture(&pool).await;
    payments.create(pending_payment("t1", "cs_1", 5000)).await?;

    let expired = event("checkout.session.expired", json!({ "id": "cs_1" }));
    let result = reconciler.handle_event(&expired).await?;
    assert!(!result.skipped);
    let payment = payments.find_by_session_id("cs_1").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Expired);

    // A completed payment is never clawed back to EXPIRED.
    payments.create(pending_payment("t1", "cs_2", 5000)).await?;
    reconciler
        .handle_event(&event("checkout.session.completed", completed_session("cs_2")))
        .await?;
    let result = reconciler
        .handle_event(&event("checkout.session.expired", json!({ "id": "cs_2" })))
        .await?;
    assert!(result.skipped);
    let payment = payments.find_by_session_id("cs_2").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn refunds_move_through_refund_states() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (payments, reconciler) = fixture(&pool).await;
    payments.create(pending_payment("t1", "cs_1", 5000)).await?;
    reconciler
        .handle_event(&event("checkout.session.completed", completed_session("cs_1")))
        .await?;

    // Partial refund, twice; stays PARTIALLY_REFUNDED and both apply.
    let partial = event(
        "charge.refunded",
        json!({ "payment_intent": "pi_1", "refunded": false }),
    );
    let result = reconciler.handle_event(&partial).await?;
    assert!(!result.skipped);
    let result = reconciler.handle_event(&partial).await?;
    assert!(!result.skipped);
    let payment = payments.find_by_payment_intent_id("pi_1").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert!(payment.refunded_at.is_some());

    // A full refund requires COMPLETED, so it no longer applies here.
    let full = event(
        "charge.refunded",
        json!({ "payment_intent": "pi_1", "refunded": true }),
    );
    let result = reconciler.handle_event(&full).await?;
    assert!(result.skipped);
    let payment = payments.find_by_payment_intent_id("pi_1").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);

    Ok(())
}

#[tokio::test]
async fn full_refund_from_completed() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (payments, reconciler) = fixture(&pool).await;
    payments.create(pending_payment("t1", "cs_1", 5000)).await?;
    reconciler
        .handle_event(&event("checkout.session.completed", completed_session("cs_1")))
        .await?;

    let result = reconciler
        .handle_event(&event(
            "charge.refunded",
            json!({ "payment_intent": "pi_1", "refunded": true }),
        ))
        .await?;
    assert!(!result.skipped);

    let payment = payments.find_by_payment_intent_id("pi_1").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert!(payment.refunded_at.is_some());

    Ok(())
}

#[tokio::test]
async fn payment_failure_merges_metadata() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (payments, reconciler) = fixture(&pool).await;

    let mut payment = pending_payment("t1", "cs_1", 5000);
    payment.metadata = json!({ "campaign": "spring" });
    payments.create(payment).await?;

    // Move to PROCESSING so the failure guard matches, attaching pi_1.
    reconciler
        .handle_event(&event(
            "checkout.session.completed",
            json!({ "id": "cs_1", "payment_status": "unpaid", "payment_intent": "pi_1" }),
        ))
        .await?;

    let result = reconciler
        .handle_event(&event(
            "payment_intent.payment_failed",
            json!({
                "id": "pi_1",
                "last_payment_error": { "message": "Card declined", "code": "card_declined" }
            }),
        ))
        .await?;
    assert!(!result.skipped);

    let payment = payments.find_by_payment_intent_id("pi_1").await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.metadata["failureReason"], json!("Card declined"));
    assert_eq!(payment.metadata["failureCode"], json!("card_declined"));
    // Pre-existing metadata keys survive the merge.
    assert_eq!(payment.metadata["campaign"], json!("spring"));

    Ok(())
}

#[tokio::test]
async fn unknown_rows_and_types_are_skipped() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (_payments, reconciler) = fixture(&pool).await;

    let result = reconciler
        .handle_event(&event("checkout.session.completed", completed_session("cs_missing")))
        .await?;
    assert!(result.handled);
    assert!(result.skipped);

    let result = reconciler
        .handle_event(&event("customer.subscription.updated", json!({ "id": "sub_1" })))
        .await?;
    assert!(!result.handled);

    Ok(())
}

#[tokio::test]
async fn construct_event_authenticates_payloads() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let (_payments, reconciler) = fixture(&pool).await;

    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_1" } }
    })
    .to_string();

    let header = common::sign_payload(payload.as_bytes(), SECRET);
    let event = reconciler.construct_event(payload.as_bytes(), &header)?;
    assert_eq!(event.event_type, "checkout.session.completed");

    let wrong = common::sign_payload(payload.as_bytes(), "whsec_other");
    assert!(reconciler.construct_event(payload.as_bytes(), &wrong).is_err());
    assert!(reconciler.construct_event(payload.as_bytes(), "").is_err());

    Ok(())
}
