use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::{AppError, Result, WebhookError},
};

/// Single webhook entry point. Signature verification happens before any
/// payment row is touched; unhandled event types still return 200 so the
/// provider does not keep redelivering them.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let Some(reconciler) = state.webhooks.as_ref() else {
        return Err(AppError::ServiceUnavailable(
            "Webhook processing is not configured".to_string(),
        ));
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    let event = reconciler.construct_event(&body, signature)?;
    let result = reconciler.handle_event(&event).await?;

    Ok(Json(json!({
        "received": true,
        "handled": result.handled,
        "eventType": result.event_type,
    })))
}
