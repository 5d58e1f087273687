//! Postgres-backed user store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | RowNotFound | N/A | `NotFound` |
//! | anything else | any | `Database` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;

use warden_core::{NewUser, PageSpec, User, UserId, UserPatch};

use super::{StoreError, UserFilter, UserStore};

const USER_COLUMNS: &str = "id, username, email, password, created_at, updated_at, deleted_at";

#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, operation: &str, clause: &str, value: Binding<'_>) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause} AND deleted_at IS NULL");
        let query = sqlx::query(&sql);
        let query = match value {
            Binding::Id(id) => query.bind(*id.as_uuid()),
            Binding::Text(text) => query.bind(text),
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(StoreError::NotFound)?;
        UserRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

enum Binding<'a> {
    Id(UserId),
    Text(&'a str),
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self), fields(size = page.size), err)]
    async fn get_all(&self, page: &PageSpec) -> Result<Vec<User>, StoreError> {
        let (before, after) = page
            .cursors()
            .map_err(|e| StoreError::InvalidPage(e.to_string()))?;

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL"));
        if let Some(before) = before {
            qb.push(" AND id < ").push_bind(*before.as_uuid());
        }
        if let Some(after) = after {
            qb.push(" AND id > ").push_bind(*after.as_uuid());
        }
        qb.push(" ORDER BY id ASC LIMIT ").push_bind(i64::from(page.size));

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_all", e))?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let user = UserRow::from_row(&row).map_err(|e| map_sqlx_error("get_all", e))?;
            users.push(user.into());
        }
        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.fetch_one_where("get_by_id", "id = $1", Binding::Id(id)).await
    }

    #[instrument(skip(self), err)]
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.fetch_one_where("get_by_email", "email = $1", Binding::Text(email))
            .await
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn create(&self, user: NewUser) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password, created_at, updated_at)
            VALUES ($1, $2, $3, $4, now(), now())
            "#,
        )
        .bind(*user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;
        Ok(())
    }

    #[instrument(skip(self, patch), fields(user_id = %id), err)]
    async fn update(&self, id: UserId, patch: &UserPatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username   = COALESCE($2, username),
                email      = COALESCE($3, email),
                password   = COALESCE($4, password),
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(*id.as_uuid())
        .bind(patch.username.as_deref())
        .bind(patch.email.as_deref())
        .bind(patch.password.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete(&self, id: UserId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(*id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn restore(&self, id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NULL, updated_at = now() WHERE id = $1 AND deleted_at IS NOT NULL",
        )
        .bind(*id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("restore", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn count_by_id(&self, id: UserId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = $1 AND deleted_at IS NULL")
            .bind(*id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_by_id", e))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), err)]
    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), err)]
    async fn exists_by_key_value(&self, filter: &UserFilter) -> Result<bool, StoreError> {
        filter.validate()?;
        if filter.is_empty() {
            return Ok(false);
        }

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT EXISTS (SELECT 1 FROM users WHERE deleted_at IS NULL");
        for (column, value) in filter.iter() {
            // column names are whitelisted by validate()
            qb.push(" AND ").push(column).push("::text = ").push_bind(value.to_owned());
        }
        qb.push(")");

        qb.build_query_scalar::<bool>()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists_by_key_value", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => StoreError::Database(format!("connection pool closed in {operation}")),
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct UserRow {
    id: uuid::Uuid,
    username: String,
    email: String,
    password: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password: row.try_get("password")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            username: row.username,
            email: row.email,
            password: row.password,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}
