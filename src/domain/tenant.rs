use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The slice of a tenant the payment core reads. The wider platform owns the
/// rest of the tenant record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub subdomain: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
