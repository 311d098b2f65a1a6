use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::Tenant,
    error::{AppError, Result},
    repository::TenantRepository,
};

#[derive(FromRow)]
struct TenantRow {
    id: String,
    name: String,
    subdomain: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteTenantRepository {
    pool: SqlitePool,
}

impl SqliteTenantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_tenant(row: TenantRow) -> Tenant {
        Tenant {
            id: row.id,
            name: row.name,
            subdomain: row.subdomain,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        }
    }
}

#[async_trait]
impl TenantRepository for SqliteTenantRepository {
    async fn create(&self, tenant: Tenant) -> Result<Tenant> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, subdomain, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.subdomain)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(&tenant.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created tenant".to_string()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, name, subdomain, created_at, updated_at FROM tenants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Self::row_to_tenant))
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, name, subdomain, created_at, updated_at FROM tenants WHERE subdomain = ?",
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Self::row_to_tenant))
    }
}
