use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::SqlitePool;

use super::StoreError;
use crate::broker::CredentialStore;
use crate::models::{Credential, User, UserId};

pub struct UserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    api_key: String,
    group_name: Option<String>,
    refresh_token: Option<String>,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    access_token: Option<String>,
    access_expiry: Option<String>,
    refresh_token: Option<String>,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers a user with a freshly generated API key.
    pub async fn create(&self, username: &str) -> Result<User, StoreError> {
        let api_key = generate_api_key();
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO users (username, api_key, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(&api_key)
        .bind(&created_at)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::Conflict(format!("username '{}'", username)));
            }
            Err(e) => return Err(e.into()),
        };

        self.get(UserId(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }

    pub async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(hydrate_user))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(hydrate_user))
    }

    pub async fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(hydrate_user))
    }

    pub async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(hydrate_user).collect())
    }

    /// Deletes the user row. Group membership must be released first.
    pub async fn delete(&self, id: UserId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for UserRepository {
    async fn load(&self, user_id: UserId) -> Result<Credential, StoreError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT access_token, access_expiry, refresh_token FROM users WHERE id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        let access_expiry = row.access_expiry.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(expiry) => Some(expiry.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable token expiry for user {}: {}", user_id, e);
                    None
                }
            }
        });

        Ok(Credential::from_parts(
            row.access_token,
            access_expiry,
            row.refresh_token,
        ))
    }

    async fn save(&self, user_id: UserId, credential: &Credential) -> Result<(), StoreError> {
        let access_expiry = credential.access_expiry().map(|e| e.to_rfc3339());

        let result = sqlx::query(
            r#"
            UPDATE users
            SET access_token = ?, access_expiry = ?, refresh_token = ?
            WHERE id = ?
            "#,
        )
        .bind(credential.access_token())
        .bind(&access_expiry)
        .bind(credential.refresh_token())
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }
}

fn hydrate_user(row: UserRow) -> User {
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    User {
        id: UserId(row.id),
        username: row.username,
        api_key: row.api_key,
        group_name: row.group_name,
        linked: row.refresh_token.is_some(),
        created_at,
    }
}

/// 32 random bytes, base64url without padding.
fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn setup() -> (UserRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(&db_path).await.unwrap();
        (UserRepository::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (repo, _temp) = setup().await;

        let user = repo.create("alice").await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.api_key.len(), 43);
        assert!(user.group_name.is_none());
        assert!(!user.linked);

        let fetched = repo.get(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.api_key, user.api_key);
    }

    #[tokio::test]
    async fn test_create_duplicate_username() {
        let (repo, _temp) = setup().await;
        repo.create("alice").await.unwrap();

        let result = repo.create("alice").await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_find_by_api_key() {
        let (repo, _temp) = setup().await;
        let alice = repo.create("alice").await.unwrap();
        repo.create("bob").await.unwrap();

        let found = repo.find_by_api_key(&alice.api_key).await.unwrap().unwrap();
        assert_eq!(found.id, alice.id);

        assert!(repo.find_by_api_key("wrong").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_username_and_list() {
        let (repo, _temp) = setup().await;
        repo.create("carol").await.unwrap();
        repo.create("alice").await.unwrap();

        assert!(repo.get_by_username("carol").await.unwrap().is_some());
        assert!(repo.get_by_username("dave").await.unwrap().is_none());

        let names: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (repo, _temp) = setup().await;
        let user = repo.create("alice").await.unwrap();

        repo.delete(user.id).await.unwrap();

        assert!(repo.get(user.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(user.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_new_user_credential_is_unlinked() {
        let (repo, _temp) = setup().await;
        let user = repo.create("alice").await.unwrap();

        let credential = repo.load(user.id).await.unwrap();

        assert_eq!(credential, Credential::unlinked());
    }

    #[tokio::test]
    async fn test_credential_round_trip() {
        let (repo, _temp) = setup().await;
        let user = repo.create("alice").await.unwrap();
        let now = Utc::now();
        let credential = Credential::issued("T1", 3600, Some("R1".to_string()), now).unwrap();

        repo.save(user.id, &credential).await.unwrap();
        let loaded = repo.load(user.id).await.unwrap();

        assert_eq!(loaded.access_token(), Some("T1"));
        assert_eq!(loaded.refresh_token(), Some("R1"));
        let drift = loaded.access_expiry().unwrap() - (now + Duration::seconds(3600));
        assert!(drift.num_seconds().abs() <= 1);
        assert!(repo.get(user.id).await.unwrap().unwrap().linked);
    }

    #[tokio::test]
    async fn test_credential_for_unknown_user() {
        let (repo, _temp) = setup().await;

        assert!(matches!(
            repo.load(UserId(42)).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.save(UserId(42), &Credential::unlinked()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_expiry_drops_access_token() {
        let (repo, _temp) = setup().await;
        let user = repo.create("alice").await.unwrap();
        sqlx::query(
            "UPDATE users SET access_token = 'T1', access_expiry = 'soon', refresh_token = 'R1' WHERE id = ?",
        )
        .bind(user.id.0)
        .execute(&repo.pool)
        .await
        .unwrap();

        let credential = repo.load(user.id).await.unwrap();

        assert!(credential.access_token().is_none());
        assert_eq!(credential.refresh_token(), Some("R1"));
    }
}
