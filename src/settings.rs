//! Runtime-changeable application settings.
//!
//! Settings live in memory behind a read lock and are written through to
//! the settings table, so a restart picks up the last applied values.
//! Environment variables only provide the defaults for keys that were
//! never persisted.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use crate::persistence::SettingsStore;
use crate::{docker, persistence};

const KEY_DOCKER_SOCKET: &str = "docker_socket";
const KEY_DISABLE_REGISTRATION: &str = "disable_registration";
const KEY_EXPLORER_IMAGE: &str = "explorer_image";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to persist setting: {0}")]
    Persist(#[from] persistence::Error),
    #[error("failed to apply docker socket: {0}")]
    SocketSwap(#[from] docker::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Values that seed the settings when the database has no persisted
/// entry for a key.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub docker_socket: String,
    pub disable_registration: bool,
    pub explorer_image: String,
}

#[derive(Debug, Clone)]
struct Current {
    docker_socket: String,
    disable_registration: bool,
    explorer_image: String,
}

type SocketChangeHandler =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = docker::Result<()>> + Send>> + Send + Sync>;

/// In-memory settings view with write-through persistence.
///
/// A socket change handler, wired once at startup, is invoked before a
/// new socket path is committed; when it fails, neither memory nor the
/// database change.
pub struct SettingsManager<S> {
    store: S,
    current: RwLock<Current>,
    on_socket_change: Option<SocketChangeHandler>,
}

impl<S: SettingsStore> SettingsManager<S> {
    /// Loads settings from the store, falling back to `defaults` for
    /// keys without a persisted value.
    pub async fn load(store: S, defaults: Defaults) -> persistence::Result<Self> {
        let docker_socket = store
            .setting(KEY_DOCKER_SOCKET)
            .await?
            .unwrap_or(defaults.docker_socket);
        let disable_registration = match store.setting(KEY_DISABLE_REGISTRATION).await? {
            Some(value) => parse_bool(&value),
            None => defaults.disable_registration,
        };
        let explorer_image = store
            .setting(KEY_EXPLORER_IMAGE)
            .await?
            .unwrap_or(defaults.explorer_image);

        Ok(Self {
            store,
            current: RwLock::new(Current {
                docker_socket,
                disable_registration,
                explorer_image,
            }),
            on_socket_change: None,
        })
    }

    /// Registers the handler invoked with the candidate path before a
    /// docker socket change is committed. Must be called before the
    /// manager is shared.
    pub fn on_socket_change(&mut self, handler: SocketChangeHandler) {
        self.on_socket_change = Some(handler);
    }

    pub async fn docker_socket(&self) -> String {
        self.current.read().await.docker_socket.clone()
    }

    pub async fn disable_registration(&self) -> bool {
        self.current.read().await.disable_registration
    }

    pub async fn explorer_image(&self) -> String {
        self.current.read().await.explorer_image.clone()
    }

    /// Applies and persists a new docker socket path.
    ///
    /// The handler runs first, outside the settings lock; its failure
    /// aborts the change, so the previous socket stays active.
    pub async fn set_docker_socket(&self, socket_path: String) -> Result<()> {
        if let Some(handler) = &self.on_socket_change {
            handler(socket_path.clone()).await?;
        }

        self.current.write().await.docker_socket = socket_path.clone();
        self.store
            .set_setting(KEY_DOCKER_SOCKET, &socket_path)
            .await?;
        Ok(())
    }

    pub async fn set_disable_registration(&self, disabled: bool) -> Result<()> {
        self.current.write().await.disable_registration = disabled;
        self.store
            .set_setting(KEY_DISABLE_REGISTRATION, if disabled { "true" } else { "false" })
            .await?;
        Ok(())
    }

    pub async fn set_explorer_image(&self, image: String) -> Result<()> {
        self.current.write().await.explorer_image = image.clone();
        self.store.set_setting(KEY_EXPLORER_IMAGE, &image).await?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteStore;

    fn defaults() -> Defaults {
        Defaults {
            docker_socket: "/var/run/docker.sock".to_owned(),
            disable_registration: false,
            explorer_image: "alpine:latest".to_owned(),
        }
    }

    async fn temp_store() -> (SqliteStore, tempfile::NamedTempFile) {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        let url = format!("sqlite://{}", tmp.path().display());
        let store = SqliteStore::connect(&url)
            .await
            .expect("failed to open test database");
        (store, tmp)
    }

    #[tokio::test]
    async fn test_load_uses_defaults_without_persisted_values() {
        let (store, _tmp) = temp_store().await;
        let settings = SettingsManager::load(store, defaults()).await.unwrap();

        assert_eq!(settings.docker_socket().await, "/var/run/docker.sock");
        assert!(!settings.disable_registration().await);
        assert_eq!(settings.explorer_image().await, "alpine:latest");
    }

    #[tokio::test]
    async fn test_persisted_values_survive_reload() {
        let (store, _tmp) = temp_store().await;

        let settings = SettingsManager::load(store.clone(), defaults()).await.unwrap();
        settings
            .set_docker_socket("/run/user/1000/docker.sock".to_owned())
            .await
            .unwrap();
        settings.set_disable_registration(true).await.unwrap();

        let reloaded = SettingsManager::load(store, defaults()).await.unwrap();
        assert_eq!(
            reloaded.docker_socket().await,
            "/run/user/1000/docker.sock"
        );
        assert!(reloaded.disable_registration().await);
    }

    #[tokio::test]
    async fn test_failed_handler_aborts_socket_change() {
        let (store, _tmp) = temp_store().await;

        let mut settings = SettingsManager::load(store, defaults()).await.unwrap();
        settings.on_socket_change(Box::new(|_path| {
            Box::pin(async {
                Err(docker::Error::Api {
                    status: 500,
                    message: "socket did not answer".to_owned(),
                })
            })
        }));

        let result = settings.set_docker_socket("/dead.sock".to_owned()).await;
        assert!(matches!(result, Err(Error::SocketSwap(_))));
        assert_eq!(settings.docker_socket().await, "/var/run/docker.sock");
    }

    #[tokio::test]
    async fn test_successful_handler_commits_socket_change() {
        let (store, _tmp) = temp_store().await;

        let mut settings = SettingsManager::load(store, defaults()).await.unwrap();
        settings.on_socket_change(Box::new(|_path| Box::pin(async { Ok(()) })));

        settings
            .set_docker_socket("/new.sock".to_owned())
            .await
            .unwrap();
        assert_eq!(settings.docker_socket().await, "/new.sock");
    }
}
