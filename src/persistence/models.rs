/// A user row as stored, including the password hash. Never serialized
/// to clients; convert to [`PublicUser`] first.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub nickname: String,
    pub created_at: String,
    pub updated_at: String,
}

/// The client-facing view of a user.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub created_at: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            nickname: user.nickname,
            created_at: user.created_at,
        }
    }
}
