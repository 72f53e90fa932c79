//! User persistence behind the [`UserStore`] trait.
//!
//! Usernames are unique as written; emails are unique case-insensitively.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::User;

pub const USERNAME_TAKEN: &str = "Username already exists";
pub const EMAIL_TAKEN: &str = "Email already registered";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(&'static str),

    #[error("User not found")]
    NotFound,

    #[error("Store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// One page of active users plus the total match count.
#[derive(Debug)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the username or email is taken.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Persist every mutable column of `user`. The username never changes.
    async fn update(&self, user: &User) -> Result<(), StoreError>;

    /// Active users ordered by creation time. `page` is 1-based.
    async fn list_active(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<UserPage, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

fn offset(page: u32, per_page: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(per_page)
}

// ----------------------------------------------------------------------------
// PostgreSQL
// ----------------------------------------------------------------------------

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
                            is_active, is_admin, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[instrument(skip(database_url))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, anyhow::Error> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect: {}", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), anyhow::Error> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
        sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Failed to fetch user: {}", e)))
    }
}

/// Map a unique-index violation to the field it guards.
fn map_write_error(e: sqlx::Error, action: &str) -> StoreError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            match db_err.constraint() {
                Some(c) if c.contains("email") => StoreError::Conflict(EMAIL_TAKEN),
                _ => StoreError::Conflict(USERNAME_TAKEN),
            }
        }
        _ => StoreError::Backend(anyhow::anyhow!("Failed to {} user: {}", action, e)),
    }
}

/// `%term%` for ILIKE with the pattern metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Failed to fetch user: {}", e)))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("username = $1", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("LOWER(email) = LOWER($1)", email).await
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name,
                               is_active, is_admin, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_admin)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "create"))?;

        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, first_name = $4, last_name = $5,
                is_active = $6, is_admin = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_admin)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "update"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_active(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<UserPage, StoreError> {
        let pattern = search.map(like_pattern);
        let filter = "is_active AND ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1)";

        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {}", filter);
        let total: i64 = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Failed to count users: {}", e)))?;

        let sql = format!(
            "SELECT {} FROM users WHERE {} ORDER BY created_at, id LIMIT $2 OFFSET $3",
            USER_COLUMNS, filter
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(&pattern)
            .bind(i64::from(per_page))
            .bind(i64::try_from(offset(page, per_page)).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Failed to list users: {}", e)))?;

        Ok(UserPage {
            users,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// In-memory
// ----------------------------------------------------------------------------

/// Process-local store. Secondary indexes reserve usernames and lowercased
/// emails through the `DashMap` entry API, so concurrent inserts of the same
/// value cannot both succeed.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<Uuid, User>,
    usernames: DashMap<String, Uuid>,
    emails: DashMap<String, Uuid>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve(index: &DashMap<String, Uuid>, key: String, id: Uuid) -> bool {
        match index.entry(key) {
            Entry::Occupied(existing) => *existing.get() == id,
            Entry::Vacant(slot) => {
                slot.insert(id);
                true
            }
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let id = self.usernames.get(username).map(|id| *id);
        Ok(id.and_then(|id| self.users.get(&id).map(|u| u.value().clone())))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let id = self.emails.get(&email.to_lowercase()).map(|id| *id);
        Ok(id.and_then(|id| self.users.get(&id).map(|u| u.value().clone())))
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        if !Self::reserve(&self.usernames, user.username.clone(), user.id) {
            return Err(StoreError::Conflict(USERNAME_TAKEN));
        }
        if !Self::reserve(&self.emails, user.email.to_lowercase(), user.id) {
            self.usernames.remove(&user.username);
            return Err(StoreError::Conflict(EMAIL_TAKEN));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let old_email = match self.users.get(&user.id) {
            Some(existing) => existing.email.to_lowercase(),
            None => return Err(StoreError::NotFound),
        };

        let new_email = user.email.to_lowercase();
        if new_email != old_email {
            if !Self::reserve(&self.emails, new_email, user.id) {
                return Err(StoreError::Conflict(EMAIL_TAKEN));
            }
            self.emails.remove(&old_email);
        }

        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_active(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<UserPage, StoreError> {
        let needle = search.map(str::to_lowercase);
        let mut matches: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.is_active)
            .filter(|u| match &needle {
                Some(n) => {
                    u.username.to_lowercase().contains(n.as_str())
                        || u.email.to_lowercase().contains(n.as_str())
                }
                None => true,
            })
            .map(|u| u.value().clone())
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let total = matches.len() as u64;
        let skip = usize::try_from(offset(page, per_page)).unwrap_or(usize::MAX);
        let users = matches
            .into_iter()
            .skip(skip)
            .take(per_page as usize)
            .collect();

        Ok(UserPage { users, total })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "$argon2id$stub".to_string(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn insert_enforces_unique_username_and_email() {
        let store = InMemoryUserStore::new();
        store.insert(&user("alice", "alice@example.com")).await.unwrap();

        let err = store
            .insert(&user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(USERNAME_TAKEN)));

        let err = store
            .insert(&user("alicia", "ALICE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(EMAIL_TAKEN)));

        // The failed insert must not leave its username reserved.
        store.insert(&user("alicia", "alicia@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn lookups_by_username_and_email() {
        let store = InMemoryUserStore::new();
        let alice = user("alice", "Alice@Example.com");
        store.insert(&alice).await.unwrap();

        assert_eq!(store.find_by_id(alice.id).await.unwrap().unwrap().id, alice.id);
        assert!(store.find_by_username("alice").await.unwrap().is_some());
        assert!(store.find_by_username("Alice").await.unwrap().is_none());
        assert!(store.find_by_email("alice@example.com").await.unwrap().is_some());
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_moves_email_reservation() {
        let store = InMemoryUserStore::new();
        let mut alice = user("alice", "alice@example.com");
        let bob = user("bob", "bob@example.com");
        store.insert(&alice).await.unwrap();
        store.insert(&bob).await.unwrap();

        alice.email = "bob@example.com".to_string();
        assert!(matches!(
            store.update(&alice).await,
            Err(StoreError::Conflict(EMAIL_TAKEN))
        ));

        alice.email = "alice2@example.com".to_string();
        store.update(&alice).await.unwrap();
        assert!(store.find_by_email("alice@example.com").await.unwrap().is_none());
        store.insert(&user("carol", "alice@example.com")).await.unwrap();

        assert!(matches!(
            store.update(&user("ghost", "ghost@example.com")).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_active_filters_and_paginates() {
        let store = InMemoryUserStore::new();
        for i in 0..15 {
            let mut u = user(&format!("user{:02}", i), &format!("user{:02}@example.com", i));
            u.created_at += chrono::Duration::seconds(i);
            store.insert(&u).await.unwrap();
        }
        let mut inactive = user("sleeper", "sleeper@example.com");
        inactive.is_active = false;
        store.insert(&inactive).await.unwrap();

        let page = store.list_active(2, 10, None).await.unwrap();
        assert_eq!(page.total, 15);
        assert_eq!(page.users.len(), 5);
        assert_eq!(page.users[0].username, "user10");

        let page = store.list_active(1, 10, Some("USER1")).await.unwrap();
        assert_eq!(page.total, 5);

        let page = store.list_active(1, 10, Some("sleeper")).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn concurrent_inserts_of_same_username_have_one_winner() {
        let store = Arc::new(InMemoryUserStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert(&user("racer", &format!("racer{}@example.com", i)))
                        .await
                        .is_ok()
                })
            })
            .collect();

        let ok = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(ok, 1);
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgUserStore::connect(&url, 2, 1).await.unwrap();
        store.run_migrations().await.unwrap();

        let suffix = Uuid::new_v4().simple().to_string();
        let u = user(&format!("pg{}", &suffix[..8]), &format!("pg{}@example.com", suffix));
        store.insert(&u).await.unwrap();
        assert!(matches!(
            store.insert(&u).await,
            Err(StoreError::Conflict(_))
        ));
        let found = store.find_by_email(&u.email.to_uppercase()).await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(u.id));
        store.health_check().await.unwrap();
    }
}
