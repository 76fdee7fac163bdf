use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{CompanyId, DealId, DealStatus, DealType, UserId},
    protocol::{CompanySummary, Deal, DealFilters, NewDeal, UserSummary},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

const DEAL_SELECT: &str = "SELECT d.id, d.title, d.value, d.status, d.deal_type, d.user_id,
        d.company_id, d.lead_source, d.product_name, d.closed_at, d.created_at, d.updated_at,
        u.name AS user_name, u.email AS user_email,
        c.company_name AS company_name, c.industry AS company_industry
     FROM deals d
     LEFT JOIN users u ON u.id = d.user_id
     LEFT JOIN companies c ON c.id = d.company_id";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Upserts on `email`: an existing user keeps its id and takes the new name.
    pub async fn create_user(&self, name: &str, email: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (name, email) VALUES (?, ?)
             ON CONFLICT(email) DO UPDATE SET name=excluded.name
             RETURNING id",
        )
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn load_user(&self, user_id: UserId) -> Result<Option<UserSummary>> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserSummary {
            id: UserId(r.get::<i64, _>(0)),
            name: r.get::<String, _>(1),
            email: r.get::<String, _>(2),
        }))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserSummary>> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserSummary {
            id: UserId(r.get::<i64, _>(0)),
            name: r.get::<String, _>(1),
            email: r.get::<String, _>(2),
        }))
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query("SELECT id, name, email FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| UserSummary {
                id: UserId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
                email: r.get::<String, _>(2),
            })
            .collect())
    }

    pub async fn create_company(&self, company_name: &str, industry: &str) -> Result<CompanyId> {
        let rec =
            sqlx::query("INSERT INTO companies (company_name, industry) VALUES (?, ?) RETURNING id")
                .bind(company_name)
                .bind(industry)
                .fetch_one(&self.pool)
                .await?;
        Ok(CompanyId(rec.get::<i64, _>(0)))
    }

    pub async fn load_company(&self, company_id: CompanyId) -> Result<Option<CompanySummary>> {
        let row = sqlx::query("SELECT id, company_name, industry FROM companies WHERE id = ?")
            .bind(company_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| CompanySummary {
            id: CompanyId(r.get::<i64, _>(0)),
            company_name: r.get::<String, _>(1),
            industry: r.get::<String, _>(2),
        }))
    }

    pub async fn list_companies(&self) -> Result<Vec<CompanySummary>> {
        let rows = sqlx::query("SELECT id, company_name, industry FROM companies ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| CompanySummary {
                id: CompanyId(r.get::<i64, _>(0)),
                company_name: r.get::<String, _>(1),
                industry: r.get::<String, _>(2),
            })
            .collect())
    }

    pub async fn create_deal(&self, deal: &NewDeal) -> Result<DealId> {
        let now = Utc::now();
        let closed_at = deal.status.is_closed().then_some(now);
        let rec = sqlx::query(
            "INSERT INTO deals (title, value, status, deal_type, user_id, company_id,
                                lead_source, product_name, closed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&deal.title)
        .bind(deal.value)
        .bind(deal.status.as_str())
        .bind(deal.deal_type.as_str())
        .bind(deal.user_id.0)
        .bind(deal.company_id.0)
        .bind(deal.lead_source.as_deref())
        .bind(deal.product_name.as_deref())
        .bind(closed_at)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(DealId(rec.get::<i64, _>(0)))
    }

    pub async fn load_deal(&self, deal_id: DealId) -> Result<Option<Deal>> {
        let row = sqlx::query(&format!("{DEAL_SELECT} WHERE d.id = ?"))
            .bind(deal_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(deal_from_row).transpose()
    }

    /// Lists deals ordered by id, applying every filter that is set.
    pub async fn list_deals(&self, filters: &DealFilters) -> Result<Vec<Deal>> {
        let mut query = QueryBuilder::<Sqlite>::new(DEAL_SELECT);
        query.push(" WHERE 1 = 1");
        if let Some(status) = filters.status {
            query.push(" AND d.status = ").push_bind(status.as_str());
        }
        if let Some(user_id) = filters.user_id {
            query.push(" AND d.user_id = ").push_bind(user_id.0);
        }
        if let Some(company_id) = filters.company_id {
            query.push(" AND d.company_id = ").push_bind(company_id.0);
        }
        if let Some(search) = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            query
                .push(" AND d.title LIKE ")
                .push_bind(format!("%{search}%"));
        }
        query
            .push(" ORDER BY d.id LIMIT ")
            .push_bind(i64::from(filters.effective_limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(filters.skip.unwrap_or(0)));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(deal_from_row).collect()
    }

    /// Writes every mutable column of `deal`. Returns false when the row is gone.
    pub async fn save_deal(&self, deal: &Deal) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE deals
             SET title = ?, value = ?, status = ?, deal_type = ?, user_id = ?, company_id = ?,
                 lead_source = ?, product_name = ?, closed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&deal.title)
        .bind(deal.value)
        .bind(deal.status.as_str())
        .bind(deal.deal_type.as_str())
        .bind(deal.user_id.0)
        .bind(deal.company_id.0)
        .bind(deal.lead_source.as_deref())
        .bind(deal.product_name.as_deref())
        .bind(deal.closed_at)
        .bind(deal.updated_at)
        .bind(deal.id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_deal(&self, deal_id: DealId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM deals WHERE id = ?")
            .bind(deal_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn deal_from_row(row: &SqliteRow) -> Result<Deal> {
    let id = DealId(row.try_get("id")?);
    let status = row
        .try_get::<String, _>("status")?
        .parse::<DealStatus>()
        .with_context(|| format!("corrupt status on deal {id}"))?;
    let deal_type = match row.try_get::<String, _>("deal_type")?.as_str() {
        "direct" => DealType::Direct,
        "agency" => DealType::Agency,
        other => return Err(anyhow!("unknown deal type '{other}'")),
    };
    let user_id = UserId(row.try_get("user_id")?);
    let company_id = CompanyId(row.try_get("company_id")?);

    let user = match (
        row.try_get::<Option<String>, _>("user_name")?,
        row.try_get::<Option<String>, _>("user_email")?,
    ) {
        (Some(name), Some(email)) => Some(UserSummary {
            id: user_id,
            name,
            email,
        }),
        _ => None,
    };
    let company = row
        .try_get::<Option<String>, _>("company_name")?
        .map(|company_name| -> Result<CompanySummary> {
            Ok(CompanySummary {
                id: company_id,
                company_name,
                industry: row
                    .try_get::<Option<String>, _>("company_industry")?
                    .unwrap_or_default(),
            })
        })
        .transpose()?;

    Ok(Deal {
        id,
        title: row.try_get("title")?,
        value: row.try_get("value")?,
        status,
        deal_type,
        user_id,
        company_id,
        lead_source: row.try_get("lead_source")?,
        product_name: row.try_get("product_name")?,
        closed_at: row.try_get::<Option<DateTime<Utc>>, _>("closed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        user,
        company,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
