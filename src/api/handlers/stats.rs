use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::{AppError, Result},
    payments::{DonorQuery, StatsPeriod, StatsQuery},
};

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub tenant_id: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Named window; explicit start/end take precedence when both are sent.
    #[serde(default)]
    pub period: Option<StatsPeriod>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub compare_previous: bool,
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct DonorParams {
    pub tenant_id: String,
    #[serde(default = "default_donor_limit")]
    pub limit: i64,
    #[serde(default)]
    pub exclude_anonymous: bool,
}

fn default_donor_limit() -> i64 {
    10
}

pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Value>> {
    if params.tenant_id.trim().is_empty() {
        return Err(AppError::BadRequest("tenant_id is required".to_string()));
    }

    let (start, end) = match (params.start, params.end, params.period) {
        (None, None, Some(period)) => {
            let (start, end) = period.date_range(Utc::now());
            (Some(start), Some(end))
        }
        (start, end, _) => (start, end),
    };

    match params.group_by.as_deref() {
        Some("month") => {
            let year = params.year.unwrap_or_else(|| Utc::now().year());
            let monthly = state.stats.monthly_breakdown(&params.tenant_id, year).await?;
            Ok(Json(json!({ "monthly": monthly })))
        }
        Some("type") => {
            let breakdown = state
                .stats
                .type_breakdown(&params.tenant_id, start, end)
                .await?;
            Ok(Json(json!({ "byType": breakdown })))
        }
        Some(other) => Err(AppError::BadRequest(format!(
            "Unknown group_by value: {}",
            other
        ))),
        None => {
            if params.compare_previous {
                let (Some(start), Some(end)) = (start, end) else {
                    return Err(AppError::BadRequest(
                        "compare_previous requires start and end, or a period".to_string(),
                    ));
                };
                let (stats, comparison) = state
                    .stats
                    .stats_with_comparison(&params.tenant_id, start, end)
                    .await?;
                Ok(Json(json!({ "stats": stats, "comparison": comparison })))
            } else {
                let query = StatsQuery {
                    start,
                    end,
                    status: None,
                };
                let stats = state.stats.payment_stats(&params.tenant_id, &query).await?;
                Ok(Json(json!({ "stats": stats })))
            }
        }
    }
}

pub async fn donors(
    State(state): State<AppState>,
    Query(params): Query<DonorParams>,
) -> Result<Json<Value>> {
    if params.tenant_id.trim().is_empty() {
        return Err(AppError::BadRequest("tenant_id is required".to_string()));
    }

    let query = DonorQuery {
        limit: params.limit,
        exclude_anonymous: params.exclude_anonymous,
    };
    let donors = state.stats.donor_stats(&params.tenant_id, &query).await?;
    Ok(Json(json!({
        "topDonors": donors.top_donors,
        "uniqueDonorCount": donors.unique_donor_count,
    })))
}
