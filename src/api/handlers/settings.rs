use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api::state::AppState,
    domain::{PaymentSettings, PaymentSettingsUpdate},
    error::Result,
};

pub async fn get(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<PaymentSettings>> {
    let settings = state.payment_settings.get_settings(&tenant_id).await?;
    Ok(Json(settings))
}

pub async fn update(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(patch): Json<PaymentSettingsUpdate>,
) -> Result<Json<PaymentSettings>> {
    let settings = state
        .payment_settings
        .update_settings(&tenant_id, patch)
        .await?;
    Ok(Json(settings))
}
