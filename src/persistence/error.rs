#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to database: {0}")]
    ConnectionError(#[source] sqlx::Error),
    #[error("failed to run initial migration: {0}")]
    MigrationError(#[source] sqlx::migrate::MigrateError),
    #[error("database query failed: {0}")]
    QueryError(#[source] sqlx::Error),
    #[error("user `{0}` already exists")]
    DuplicateUser(String),
}

pub type Result<T> = std::result::Result<T, Error>;
