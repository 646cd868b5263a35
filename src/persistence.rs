mod error;
mod models;
mod sqlite;
mod store;

pub use error::{Error, Result};
pub use models::{PublicUser, User};
pub use sqlite::SqliteStore;
pub use store::{SettingsStore, UserStore};
