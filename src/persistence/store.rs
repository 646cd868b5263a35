use super::Result;
use super::models::User;

pub trait UserStore {
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        nickname: &str,
    ) -> impl std::future::Future<Output = Result<User>> + Send;

    fn user_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>>> + Send;

    fn list_users(&self) -> impl std::future::Future<Output = Result<Vec<User>>> + Send;

    /// Returns false when no user with the given id existed.
    fn delete_user(&self, id: i64) -> impl std::future::Future<Output = Result<bool>> + Send;

    fn count_users(&self) -> impl std::future::Future<Output = Result<i64>> + Send;

    fn update_password(
        &self,
        id: i64,
        password_hash: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait SettingsStore {
    fn setting(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    fn set_setting(
        &self,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
