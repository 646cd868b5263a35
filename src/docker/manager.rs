use tokio::sync::RwLock;

use super::client::{Client, LogStream};
use super::detect::SelfIdentity;
use super::explorer;
use super::models::{
    ContainerDetail, ContainerSummary, VolumeFileContent, VolumeFileEntry, VolumeSummary,
};
use super::{Error, Result};

struct Connection {
    client: Client,
    socket_path: String,
}

/// Serializes access to the active daemon connection and enforces the
/// self-protection rule.
///
/// All operations take a read lock on the connection, so in-flight calls
/// on the old client finish undisturbed while
/// [`Manager::restart_with_socket`] waits for the write lock.
pub struct Manager {
    conn: RwLock<Connection>,
    identity: SelfIdentity,
}

impl Manager {
    /// Creates a manager over the socket at `socket_path`.
    ///
    /// The connection is lazy; an unreachable socket is not an error
    /// here. Callers that want an early liveness signal use
    /// [`Manager::ping`].
    pub fn new(socket_path: impl Into<String>, identity: SelfIdentity) -> Result<Self> {
        let socket_path = socket_path.into();
        let client = Client::new(&socket_path)?;
        Ok(Self {
            conn: RwLock::new(Connection {
                client,
                socket_path,
            }),
            identity,
        })
    }

    pub fn identity(&self) -> &SelfIdentity {
        &self.identity
    }

    /// The socket path of the active connection.
    pub async fn socket_path(&self) -> String {
        self.conn.read().await.socket_path.clone()
    }

    /// Replaces the active connection with one over `socket_path`.
    ///
    /// The candidate connection is built and pinged before the swap, so a
    /// dead socket leaves the current connection untouched and fully
    /// usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the candidate socket does not
    /// answer a ping.
    pub async fn restart_with_socket(&self, socket_path: impl Into<String>) -> Result<()> {
        let socket_path = socket_path.into();
        let candidate = Client::new(&socket_path)?;
        candidate.ping().await?;

        let mut conn = self.conn.write().await;
        log::info!(
            "switching docker socket from `{}` to `{}`",
            conn.socket_path,
            socket_path
        );
        conn.client = candidate;
        conn.socket_path = socket_path;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.client().await.ping().await
    }

    /// Lists all containers with `is_self` stamped on the container this
    /// process runs in.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let mut containers = self.client().await.list_containers().await?;
        for container in &mut containers {
            container.is_self = self.identity.matches(&container.id);
        }
        Ok(containers)
    }

    pub async fn container_detail(&self, container_id: &str) -> Result<ContainerDetail> {
        let mut detail = self.client().await.container_detail(container_id).await?;
        detail.summary.is_self = self.identity.matches(&detail.summary.id);
        Ok(detail)
    }

    /// Starting is always allowed, including on the own container.
    pub async fn start_container(&self, container_id: &str) -> Result<()> {
        self.client().await.start_container(container_id).await
    }

    /// # Errors
    ///
    /// Returns [`Error::SelfOperationDenied`] when `container_id` refers
    /// to the container this process runs in.
    pub async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.deny_self(container_id)?;
        self.client().await.stop_container(container_id).await
    }

    /// # Errors
    ///
    /// Returns [`Error::SelfOperationDenied`] when `container_id` refers
    /// to the container this process runs in.
    pub async fn restart_container(&self, container_id: &str) -> Result<()> {
        self.deny_self(container_id)?;
        self.client().await.restart_container(container_id).await
    }

    pub async fn list_volumes(&self) -> Result<Vec<VolumeSummary>> {
        self.client().await.list_volumes().await
    }

    pub async fn remove_volume(&self, volume_name: &str) -> Result<()> {
        self.client().await.remove_volume(volume_name).await
    }

    /// Opens a log stream for a container. The stream holds its own
    /// connection handle and survives a subsequent socket swap.
    pub async fn stream_logs(&self, container_id: &str, follow: bool) -> LogStream {
        self.client().await.stream_logs(container_id, follow)
    }

    /// Lists the entries of a directory inside a volume via an ephemeral
    /// helper container running `image`.
    pub async fn explore_volume(
        &self,
        image: &str,
        volume_name: &str,
        path: &str,
    ) -> explorer::Result<Vec<VolumeFileEntry>> {
        let client = self.client().await;
        explorer::list_directory(&client, image, volume_name, path).await
    }

    /// Reads a single file out of a volume via an ephemeral helper
    /// container running `image`.
    pub async fn read_volume_file(
        &self,
        image: &str,
        volume_name: &str,
        path: &str,
    ) -> explorer::Result<VolumeFileContent> {
        let client = self.client().await;
        explorer::read_file(&client, image, volume_name, path).await
    }

    async fn client(&self) -> Client {
        self.conn.read().await.client.clone()
    }

    fn deny_self(&self, container_id: &str) -> Result<()> {
        if self.identity.matches(container_id) {
            return Err(Error::SelfOperationDenied);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_identity(id: &str) -> (Manager, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let socket = dir.path().join("docker.sock");
        std::fs::File::create(&socket).expect("failed to create socket placeholder");
        let identity = SelfIdentity {
            in_container: true,
            container_id: Some(id.to_owned()),
        };
        let manager = Manager::new(socket.to_str().expect("utf-8 temp path"), identity)
            .expect("lazy connect should succeed");
        (manager, dir)
    }

    #[tokio::test]
    async fn test_stop_own_container_denied_before_any_io() {
        let (manager, _dir) = manager_with_identity("0123456789ab");
        let err = manager.stop_container("0123456789ab").await.unwrap_err();
        assert!(matches!(err, Error::SelfOperationDenied));
    }

    #[tokio::test]
    async fn test_restart_own_container_denied_with_full_id() {
        let (manager, _dir) = manager_with_identity("0123456789ab");
        let full = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let err = manager.restart_container(full).await.unwrap_err();
        assert!(matches!(err, Error::SelfOperationDenied));
    }

    #[tokio::test]
    async fn test_failed_socket_swap_keeps_current_connection() {
        let (manager, dir) = manager_with_identity("0123456789ab");
        let result = manager.restart_with_socket("/also/not/there.sock").await;
        assert!(result.is_err());
        let original = dir.path().join("docker.sock");
        assert_eq!(
            manager.socket_path().await,
            original.to_str().expect("utf-8 temp path")
        );
    }
}
