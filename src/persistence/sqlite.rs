use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use super::models::User;
use super::store::{SettingsStore, UserStore};
use super::{Error, Result};

/// SQLite-backed store for users and persisted settings.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    /// Opens (and creates, if missing) the database at `database_url`
    /// and brings the schema up to date.
    ///
    /// # Arguments
    ///
    /// * `database_url` - A sqlx SQLite URL, e.g. `sqlite:///data/app.db`.
    ///
    /// # Errors
    ///
    /// * [`Error::ConnectionError`] if the URL is invalid or the pool
    ///   cannot be opened.
    /// * [`Error::MigrationError`] if a schema migration fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(Error::ConnectionError)?
            .create_if_missing(true);
        let db = SqlitePool::connect_with(options)
            .await
            .map_err(Error::ConnectionError)?;
        sqlx::migrate!()
            .run(&db)
            .await
            .map_err(Error::MigrationError)?;
        Ok(Self { db })
    }
}

impl UserStore for SqliteStore {
    /// Inserts a new user and returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateUser`] when the username is already
    /// taken.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        nickname: &str,
    ) -> Result<User> {
        const INSERT_QUERY: &str = r#"
INSERT INTO users (username, password_hash, nickname)
VALUES (?, ?, ?)
RETURNING id, username, password_hash, nickname, created_at, updated_at
"#;
        sqlx::query_as(INSERT_QUERY)
            .bind(username)
            .bind(password_hash)
            .bind(nickname)
            .fetch_one(&self.db)
            .await
            .map_err(|err| {
                let unique_violation = err
                    .as_database_error()
                    .is_some_and(|db_err| db_err.is_unique_violation());
                if unique_violation {
                    Error::DuplicateUser(username.to_owned())
                } else {
                    Error::QueryError(err)
                }
            })
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .map_err(Error::QueryError)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query_as("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.db)
            .await
            .map_err(Error::QueryError)
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(Error::QueryError)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .map_err(Error::QueryError)
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(Error::QueryError)?;
        Ok(())
    }
}

impl SettingsStore for SqliteStore {
    async fn setting(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .map_err(Error::QueryError)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        const UPSERT_QUERY: &str = r#"
INSERT INTO settings (key, value)
VALUES (?, ?)
ON CONFLICT (key) DO UPDATE SET value = excluded.value
"#;
        sqlx::query(UPSERT_QUERY)
            .bind(key)
            .bind(value)
            .execute(&self.db)
            .await
            .map_err(Error::QueryError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (SqliteStore, tempfile::NamedTempFile) {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        let url = format!("sqlite://{}", tmp.path().display());
        let store = SqliteStore::connect(&url)
            .await
            .expect("failed to open test database");
        (store, tmp)
    }

    #[tokio::test]
    async fn test_create_and_fetch_user() {
        let (store, _tmp) = temp_store().await;

        let created = store
            .create_user("admin", "$2b$fakehash", "Administrator")
            .await
            .unwrap();
        assert_eq!(created.username, "admin");
        assert_eq!(created.nickname, "Administrator");

        let fetched = store.user_by_username("admin").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.password_hash, "$2b$fakehash");

        assert!(store.user_by_username("nobody").await.unwrap().is_none());
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (store, _tmp) = temp_store().await;

        store.create_user("admin", "hash1", "").await.unwrap();
        let err = store.create_user("admin", "hash2", "").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateUser(name) if name == "admin"));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (store, _tmp) = temp_store().await;

        let user = store.create_user("temp", "hash", "").await.unwrap();
        assert!(store.delete_user(user.id).await.unwrap());
        assert!(!store.delete_user(user.id).await.unwrap());
        assert_eq!(store.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_overwrite() {
        let (store, _tmp) = temp_store().await;

        assert!(store.setting("docker_socket").await.unwrap().is_none());

        store
            .set_setting("docker_socket", "/var/run/docker.sock")
            .await
            .unwrap();
        store
            .set_setting("docker_socket", "/run/user/1000/docker.sock")
            .await
            .unwrap();

        let value = store.setting("docker_socket").await.unwrap();
        assert_eq!(value.as_deref(), Some("/run/user/1000/docker.sock"));
    }
}
