use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PaymentStatus, PaymentType};
use crate::error::{AppError, Result};
use crate::repository::PaymentRepository;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total_amount: i64,
    pub total_count: i64,
    pub average_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBucket {
    /// "YYYY-MM"
    pub month: String,
    pub amount: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeBreakdown {
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub amount: i64,
    pub count: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorSummary {
    pub email: String,
    pub name: Option<String>,
    pub total_amount: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorStats {
    pub top_donors: Vec<DonorSummary>,
    pub unique_donor_count: i64,
}

/// Rounded percentage change against the immediately preceding period.
/// A zero previous value reports 0 rather than dividing by zero, so "0%"
/// can mean either no change or no baseline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsComparison {
    pub amount_change: i64,
    pub count_change: i64,
}

/// Raw per-type aggregate as it comes out of the store.
#[derive(Debug, Clone)]
pub struct TypeTotal {
    pub payment_type: PaymentType,
    pub amount: i64,
    pub count: i64,
}

/// Amount plus completion instant, for bucketing by month.
#[derive(Debug, Clone)]
pub struct CompletedPayment {
    pub amount: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct StatsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Defaults to COMPLETED; pending or failed rows are not revenue.
    pub status: Option<PaymentStatus>,
}

/// Named reporting windows offered by the dashboard. The fiscal year is the
/// Japanese one, April through March.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum StatsPeriod {
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "year")]
    Year,
    #[serde(rename = "last30days")]
    Last30Days,
    #[serde(rename = "fiscalYear")]
    FiscalYear,
}

impl StatsPeriod {
    /// Resolves the window relative to `reference`, usually now. Calendar
    /// windows end on their last second, matching the inclusive range
    /// filters in the store.
    pub fn date_range(self, reference: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let year = reference.year();
        let month = reference.month();

        match self {
            StatsPeriod::Month => {
                let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap();
                let (next_year, next_month) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                let end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).unwrap()
                    - Duration::seconds(1);
                (start, end)
            }
            StatsPeriod::Year => (
                Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).unwrap(),
            ),
            StatsPeriod::Last30Days => (reference - Duration::days(30), reference),
            StatsPeriod::FiscalYear => {
                let fiscal_start_year = if month >= 4 { year } else { year - 1 };
                (
                    Utc.with_ymd_and_hms(fiscal_start_year, 4, 1, 0, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(fiscal_start_year + 1, 3, 31, 23, 59, 59)
                        .unwrap(),
                )
            }
        }
    }
}

/// Upper bound on a donor page; negative or oversized limits are clamped
/// rather than handed to SQL, where a negative LIMIT means "no limit".
pub const MAX_DONOR_PAGE: i64 = 100;

#[derive(Debug, Clone)]
pub struct DonorQuery {
    pub limit: i64,
    pub exclude_anonymous: bool,
}

impl Default for DonorQuery {
    fn default() -> Self {
        Self {
            limit: 10,
            exclude_anonymous: false,
        }
    }
}

/// Read-only reporting over terminal payment rows. Statuses that do not
/// represent realized revenue never enter these numbers unless a caller
/// asks for them explicitly.
pub struct StatsService {
    payments: Arc<dyn PaymentRepository>,
}

impl StatsService {
    pub fn new(payments: Arc<dyn PaymentRepository>) -> Self {
        Self { payments }
    }

    pub async fn payment_stats(&self, tenant_id: &str, query: &StatsQuery) -> Result<PaymentStats> {
        let status = query.status.unwrap_or(PaymentStatus::Completed);
        self.payments
            .aggregate_stats(tenant_id, status, query.start, query.end)
            .await
    }

    /// Always returns exactly 12 buckets, zero-filled, keyed by completion
    /// date. A payment refunded later still counts in the month it
    /// completed; refund accounting is a separate concern.
    pub async fn monthly_breakdown(&self, tenant_id: &str, year: i32) -> Result<Vec<MonthlyBucket>> {
        let start = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| AppError::BadRequest(format!("invalid year: {}", year)))?;
        let end = Utc
            .with_ymd_and_hms(year, 12, 31, 23, 59, 59)
            .single()
            .ok_or_else(|| AppError::BadRequest(format!("invalid year: {}", year)))?;

        let mut buckets: Vec<MonthlyBucket> = (1..=12)
            .map(|month| MonthlyBucket {
                month: format!("{:04}-{:02}", year, month),
                amount: 0,
                count: 0,
            })
            .collect();

        for payment in self
            .payments
            .list_completed_between(tenant_id, start, end)
            .await?
        {
            let index = payment.completed_at.month0() as usize;
            buckets[index].amount += payment.amount;
            buckets[index].count += 1;
        }

        Ok(buckets)
    }

    /// Percentages are rounded per entry over the returned set, so they may
    /// not sum to exactly 100.
    pub async fn type_breakdown(
        &self,
        tenant_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TypeBreakdown>> {
        let totals = self.payments.totals_by_type(tenant_id, start, end).await?;
        if totals.is_empty() {
            return Ok(Vec::new());
        }

        let total_amount: i64 = totals.iter().map(|t| t.amount).sum();

        Ok(totals
            .into_iter()
            .map(|t| TypeBreakdown {
                payment_type: t.payment_type,
                amount: t.amount,
                count: t.count,
                percentage: rounded_percentage(t.amount, total_amount),
            })
            .collect())
    }

    pub async fn donor_stats(&self, tenant_id: &str, query: &DonorQuery) -> Result<DonorStats> {
        let limit = query.limit.clamp(1, MAX_DONOR_PAGE);
        let top_donors = self
            .payments
            .top_donors(tenant_id, query.exclude_anonymous, limit)
            .await?;
        // Distinct count is taken before truncation, not from the page.
        let unique_donor_count = self
            .payments
            .distinct_donor_count(tenant_id, query.exclude_anonymous)
            .await?;

        Ok(DonorStats {
            top_donors,
            unique_donor_count,
        })
    }

    /// Compares a window against the immediately preceding window of the
    /// same duration (`prev_end = start - 1ms`).
    pub async fn stats_with_comparison(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(PaymentStats, StatsComparison)> {
        let current = self
            .payments
            .aggregate_stats(tenant_id, PaymentStatus::Completed, Some(start), Some(end))
            .await?;

        let duration = end - start;
        let prev_end = start - Duration::milliseconds(1);
        let prev_start = prev_end - duration;

        let previous = self
            .payments
            .aggregate_stats(
                tenant_id,
                PaymentStatus::Completed,
                Some(prev_start),
                Some(prev_end),
            )
            .await?;

        let comparison = StatsComparison {
            amount_change: percent_change(current.total_amount, previous.total_amount),
            count_change: percent_change(current.total_count, previous.total_count),
        };

        Ok((current, comparison))
    }
}

fn rounded_percentage(part: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as i64
}

fn percent_change(current: i64, previous: i64) -> i64 {
    if previous <= 0 {
        return 0;
    }
    (((current - previous) as f64 / previous as f64) * 100.0).round() as i64
}
