//! User records and the stored refresh-token hash.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists")]
    Conflict,
    #[error("user not found")]
    NotFound,
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub refresh_token_hash: Option<String>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("password_hash", &"***")
            .field(
                "refresh_token_hash",
                &self.refresh_token_hash.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence for users. Each write must be atomic per user.
pub trait UserStore: Send + Sync {
    fn create<'a>(&'a self, user: &'a UserRecord) -> StoreFuture<'a, ()>;

    fn find_by_id(&self, user_id: Uuid) -> StoreFuture<'_, Option<UserRecord>>;

    fn find_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<UserRecord>>;

    /// Replace the stored refresh hash; the previous lineage stops matching.
    fn update_refresh_hash<'a>(&'a self, user_id: Uuid, digest: &'a str) -> StoreFuture<'a, ()>;
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to Postgres.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    /// Create the `users` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema statements fail.
    pub async fn ensure_schema(&self) -> Result<()> {
        let span = tracing::info_span!("db.schema", db.system = "postgresql");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }

    async fn insert(&self, user: &UserRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO users (user_id, email, password_hash, refresh_token_hash)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user.user_id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.refresh_token_hash.as_deref())
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(StoreError::Database(err)),
        }
    }

    async fn select_one(
        &self,
        query: &'static str,
        operation: &'static str,
        bind: SelectKey<'_>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = operation,
            db.statement = query
        );
        let query = sqlx::query(query);
        let query = match bind {
            SelectKey::Id(id) => query.bind(id),
            SelectKey::Email(email) => query.bind(email),
        };
        let row = query.fetch_optional(&self.pool).instrument(span).await?;

        Ok(row.map(|row| UserRecord {
            user_id: row.get("user_id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            refresh_token_hash: row.get("refresh_token_hash"),
        }))
    }

    async fn set_refresh_hash(&self, user_id: Uuid, digest: &str) -> Result<(), StoreError> {
        let query = r"
            UPDATE users
            SET refresh_token_hash = $2,
                updated_at = NOW()
            WHERE user_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(digest)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

enum SelectKey<'a> {
    Id(Uuid),
    Email(&'a str),
}

const SELECT_BY_ID: &str = r"
    SELECT user_id, email, password_hash, refresh_token_hash
    FROM users
    WHERE user_id = $1
";

const SELECT_BY_EMAIL: &str = r"
    SELECT user_id, email, password_hash, refresh_token_hash
    FROM users
    WHERE email = $1
";

impl UserStore for PgUserStore {
    fn create<'a>(&'a self, user: &'a UserRecord) -> StoreFuture<'a, ()> {
        Box::pin(self.insert(user))
    }

    fn find_by_id(&self, user_id: Uuid) -> StoreFuture<'_, Option<UserRecord>> {
        Box::pin(self.select_one(SELECT_BY_ID, "SELECT", SelectKey::Id(user_id)))
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<UserRecord>> {
        Box::pin(self.select_one(SELECT_BY_EMAIL, "SELECT", SelectKey::Email(email)))
    }

    fn update_refresh_hash<'a>(&'a self, user_id: Uuid, digest: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.set_refresh_hash(user_id, digest))
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// In-process store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn create<'a>(&'a self, user: &'a UserRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut users = self.users.lock().await;
            if users.contains_key(&user.user_id)
                || users.values().any(|existing| existing.email == user.email)
            {
                return Err(StoreError::Conflict);
            }
            users.insert(user.user_id, user.clone());
            Ok(())
        })
    }

    fn find_by_id(&self, user_id: Uuid) -> StoreFuture<'_, Option<UserRecord>> {
        Box::pin(async move { Ok(self.users.lock().await.get(&user_id).cloned()) })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<UserRecord>> {
        Box::pin(async move {
            Ok(self
                .users
                .lock()
                .await
                .values()
                .find(|user| user.email == email)
                .cloned())
        })
    }

    fn update_refresh_hash<'a>(&'a self, user_id: Uuid, digest: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut users = self.users.lock().await;
            let user = users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
            user.refresh_token_hash = Some(digest.to_string());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use sqlx::postgres::{PgConnectOptions, PgSslMode};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    fn record(email: &str) -> UserRecord {
        UserRecord {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            refresh_token_hash: None,
        }
    }

    #[tokio::test]
    async fn memory_store_create_and_find() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        let user = record("alice@example.com");
        store.create(&user).await?;

        assert_eq!(store.find_by_id(user.user_id).await?, Some(user.clone()));
        assert_eq!(
            store.find_by_email("alice@example.com").await?,
            Some(user.clone())
        );
        assert_eq!(store.find_by_id(Uuid::new_v4()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_email() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        store.create(&record("alice@example.com")).await?;
        assert!(matches!(
            store.create(&record("alice@example.com")).await,
            Err(StoreError::Conflict)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_overwrites_refresh_hash() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        let user = record("alice@example.com");
        store.create(&user).await?;

        store.update_refresh_hash(user.user_id, "first").await?;
        store.update_refresh_hash(user.user_id, "second").await?;

        let stored = store.find_by_id(user.user_id).await?;
        assert_eq!(
            stored.and_then(|u| u.refresh_token_hash),
            Some("second".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_update_unknown_user() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.update_refresh_hash(Uuid::new_v4(), "digest").await,
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn user_record_debug_hides_hashes() {
        let mut user = record("alice@example.com");
        user.refresh_token_hash = Some("$argon2id$refresh".to_string());
        let rendered = format!("{user:?}");
        assert!(!rendered.contains("argon2id"));
        assert!(rendered.contains("alice@example.com"));
    }

    fn unreachable_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("invalid")
            .database("invalid")
            .ssl_mode(PgSslMode::Disable);
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy_with(options)
    }

    #[tokio::test]
    async fn pg_store_surfaces_database_errors() {
        let store = PgUserStore::from_pool(unreachable_pool());
        assert!(matches!(
            store.find_by_id(Uuid::new_v4()).await,
            Err(StoreError::Database(_))
        ));
        assert!(matches!(
            store.update_refresh_hash(Uuid::new_v4(), "digest").await,
            Err(StoreError::Database(_))
        ));
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError { code: None }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
