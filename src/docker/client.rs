use std::collections::HashMap;
use std::pin::Pin;

use bollard::container::LogOutput;
use bollard::models::{
    ContainerCreateBody, ContainerState, ContainerSummaryStateEnum, HealthStatusEnum,
    MountPointTypeEnum, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptionsBuilder, ListVolumesOptions, LogsOptionsBuilder,
    RemoveContainerOptionsBuilder, RemoveVolumeOptions, RestartContainerOptionsBuilder,
    StartContainerOptions, StopContainerOptionsBuilder, WaitContainerOptionsBuilder,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::{Stream, StreamExt};

use super::models::{
    ContainerDetail, ContainerSummary, MountEntry, NetworkAttachment, PortBinding, RestartPolicy,
    VolumeSummary,
};
use super::{Error, Result};

/// Length of the short container id form (12 hex characters).
pub const SHORT_ID_LEN: usize = 12;

/// Grace period before the daemon force-kills a container on stop/restart.
const STOP_GRACE_SECS: i32 = 10;

/// Number of recent lines a log stream starts with.
const LOG_TAIL: &str = "100";

/// Client-side timeout for daemon requests, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 120;

const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

const HEALTH_NONE: &str = "none";

/// A raw, demux-ready container log stream. Items are the daemon's
/// frame-tagged stdout/stderr chunks; the caller owns dropping it.
pub type LogStream =
    Pin<Box<dyn Stream<Item = std::result::Result<LogOutput, bollard::errors::Error>> + Send>>;

/// Truncates a container id to its short 12-character form.
pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Stateless-per-call adapter over the Docker control socket.
///
/// Every operation maps one daemon call (plus any secondary inspects the
/// result needs) and returns a typed error; no operation retries
/// internally.
#[derive(Debug, Clone)]
pub struct Client {
    docker: Docker,
}

impl Client {
    /// Creates a client for the Unix control socket at `socket_path`.
    ///
    /// Connection setup is lazy; an unreachable socket surfaces as
    /// [`Error::Unavailable`] on the first operation (use [`Client::ping`]
    /// to probe).
    pub fn new(socket_path: &str) -> Result<Self> {
        let docker = Docker::connect_with_socket(socket_path, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .map_err(Error::Unavailable)?;
        Ok(Self { docker })
    }

    /// Lists all containers, running and stopped.
    ///
    /// Health is resolved with a secondary inspect only for running
    /// containers; stopped containers report `"none"`. Always returns a
    /// collection, possibly empty.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptionsBuilder::new().all(true).build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(Error::from_daemon)?;

        let mut result = Vec::with_capacity(containers.len());
        for container in containers {
            let id = container.id.unwrap_or_default();
            let health = if container.state == Some(ContainerSummaryStateEnum::RUNNING) {
                self.health_of(&id).await
            } else {
                HEALTH_NONE.to_owned()
            };

            let name = container
                .names
                .as_ref()
                .and_then(|names| names.first())
                .map(|name| name.trim_start_matches('/').to_owned())
                .unwrap_or_else(|| "unknown".to_owned());

            let labels = container.labels.unwrap_or_default();
            result.push(ContainerSummary {
                id: short_id(&id),
                name,
                image: container.image.unwrap_or_default(),
                state: container.state.map(|s| s.to_string()).unwrap_or_default(),
                status: container.status.unwrap_or_default(),
                health,
                created: container.created.unwrap_or_default(),
                is_self: false,
                compose_project: labels.get(COMPOSE_PROJECT_LABEL).cloned().unwrap_or_default(),
                compose_service: labels.get(COMPOSE_SERVICE_LABEL).cloned().unwrap_or_default(),
            });
        }

        Ok(result)
    }

    async fn health_of(&self, id: &str) -> String {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => health_string(inspect.state.as_ref()),
            // Best effort; a failed secondary inspect leaves health unset.
            Err(_) => HEALTH_NONE.to_owned(),
        }
    }

    /// Inspects a single container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the id does not resolve.
    pub async fn container_detail(&self, container_id: &str) -> Result<ContainerDetail> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(Error::from_daemon)?;

        let state = inspect.state.unwrap_or_default();
        let config = inspect.config.unwrap_or_default();
        let labels = config.labels.unwrap_or_default();
        let status = state.status.map(|s| s.to_string()).unwrap_or_default();

        let created = inspect
            .created
            .as_deref()
            .and_then(|created| chrono::DateTime::parse_from_rfc3339(created).ok())
            .map(|created| created.timestamp())
            .unwrap_or_default();

        let summary = ContainerSummary {
            id: short_id(inspect.id.as_deref().unwrap_or_default()),
            name: inspect
                .name
                .as_deref()
                .map(|name| name.trim_start_matches('/').to_owned())
                .unwrap_or_default(),
            image: config.image.unwrap_or_default(),
            state: status.clone(),
            status,
            health: health_string(Some(&state)),
            created,
            is_self: false,
            compose_project: labels.get(COMPOSE_PROJECT_LABEL).cloned().unwrap_or_default(),
            compose_service: labels.get(COMPOSE_SERVICE_LABEL).cloned().unwrap_or_default(),
        };

        let restart_policy = inspect
            .host_config
            .as_ref()
            .and_then(|host| host.restart_policy.as_ref())
            .and_then(restart_policy);

        let networks = inspect
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.as_ref())
            .map(|networks| {
                networks
                    .iter()
                    .map(|(name, endpoint)| {
                        (
                            name.clone(),
                            NetworkAttachment {
                                network_id: endpoint.network_id.clone().unwrap_or_default(),
                                gateway: endpoint.gateway.clone().unwrap_or_default(),
                                ip_address: endpoint.ip_address.clone().unwrap_or_default(),
                                mac_address: endpoint.mac_address.clone().unwrap_or_default(),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let ports = port_bindings(
            inspect
                .network_settings
                .as_ref()
                .and_then(|settings| settings.ports.as_ref()),
        );

        let mounts = inspect
            .mounts
            .unwrap_or_default()
            .iter()
            .map(|mount| MountEntry {
                mount_type: mount.typ.map(|t| t.to_string()).unwrap_or_default(),
                source: mount.source.clone().unwrap_or_default(),
                destination: mount.destination.clone().unwrap_or_default(),
                mode: mount.mode.clone().unwrap_or_default(),
                rw: mount.rw.unwrap_or_default(),
            })
            .collect();

        Ok(ContainerDetail {
            summary,
            restart_policy,
            env: config.env.unwrap_or_default(),
            networks,
            ports,
            mounts,
            hostname: config.hostname.unwrap_or_default(),
        })
    }

    pub async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await
            .map_err(Error::from_daemon)
    }

    /// Stops a container, giving it [`STOP_GRACE_SECS`] before the daemon
    /// sends the kill signal.
    pub async fn stop_container(&self, container_id: &str) -> Result<()> {
        let options = StopContainerOptionsBuilder::new().t(STOP_GRACE_SECS).build();
        self.docker
            .stop_container(container_id, Some(options))
            .await
            .map_err(Error::from_daemon)
    }

    /// Restarts a container with the same grace period as
    /// [`Client::stop_container`].
    pub async fn restart_container(&self, container_id: &str) -> Result<()> {
        let options = RestartContainerOptionsBuilder::new()
            .t(STOP_GRACE_SECS)
            .build();
        self.docker
            .restart_container(container_id, Some(options))
            .await
            .map_err(Error::from_daemon)
    }

    /// Lists all volumes, newest first, with the short ids of the
    /// containers currently mounting each one.
    pub async fn list_volumes(&self) -> Result<Vec<VolumeSummary>> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions>)
            .await
            .map_err(Error::from_daemon)?;

        let options = ListContainersOptionsBuilder::new().all(true).build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(Error::from_daemon)?;

        let mut volume_users: HashMap<String, Vec<String>> = HashMap::new();
        for container in containers {
            let Some(id) = container.id else { continue };
            let inspect = match self
                .docker
                .inspect_container(&id, None::<InspectContainerOptions>)
                .await
            {
                Ok(inspect) => inspect,
                Err(err) => {
                    log::warn!(
                        "failed to inspect container `{}` for volume mapping: {}",
                        short_id(&id),
                        err
                    );
                    continue;
                }
            };
            for mount in inspect.mounts.unwrap_or_default() {
                if mount.typ == Some(MountPointTypeEnum::VOLUME) {
                    if let Some(name) = mount.name {
                        volume_users.entry(name).or_default().push(short_id(&id));
                    }
                }
            }
        }

        let mut result: Vec<VolumeSummary> = response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| VolumeSummary {
                containers: volume_users.remove(&volume.name).unwrap_or_default(),
                name: volume.name,
                driver: volume.driver,
                mountpoint: volume.mountpoint,
                created_at: volume.created_at.unwrap_or_default(),
                scope: volume.scope.map(|s| s.to_string()).unwrap_or_default(),
            })
            .collect();

        sort_volumes(&mut result);
        Ok(result)
    }

    /// Removes a volume without forcing; the daemon rejects the call when
    /// the volume is still in use.
    pub async fn remove_volume(&self, volume_name: &str) -> Result<()> {
        self.docker
            .remove_volume(volume_name, None::<RemoveVolumeOptions>)
            .await
            .map_err(Error::from_daemon)
    }

    /// Opens the combined frame-tagged log stream for a container,
    /// tailing the most recent [`LOG_TAIL`] lines.
    pub fn stream_logs(&self, container_id: &str, follow: bool) -> LogStream {
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .follow(follow)
            .timestamps(true)
            .tail(LOG_TAIL)
            .build();
        Box::pin(self.docker.logs(container_id, Some(options)))
    }

    /// Liveness check against the control socket.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map(|_| ()).map_err(Error::from_daemon)
    }

    /// Creates (but does not start) an ephemeral container and returns its
    /// id.
    pub(super) async fn create_ephemeral(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> Result<String> {
        use bollard::query_parameters::CreateContainerOptionsBuilder;

        let options = CreateContainerOptionsBuilder::new().name(name).build();
        let response = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(Error::from_daemon)?;
        Ok(response.id)
    }

    /// Blocks until the container reaches a not-running state and returns
    /// its exit code.
    ///
    /// A non-zero exit is a normal terminal state here, not an error; only
    /// transport-level wait failures are surfaced.
    pub(super) async fn wait_not_running(&self, container_id: &str) -> Result<i64> {
        let options = WaitContainerOptionsBuilder::new()
            .condition("not-running")
            .build();
        let mut wait = self.docker.wait_container(container_id, Some(options));
        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(Error::from_daemon(err)),
            None => Ok(0),
        }
    }

    /// Collects a stopped container's full output, demultiplexed into
    /// stdout bytes and stderr text.
    pub(super) async fn collect_output(&self, container_id: &str) -> Result<(Vec<u8>, String)> {
        let options = LogsOptionsBuilder::new().stdout(true).stderr(true).build();
        let mut stream = self.docker.logs(container_id, Some(options));

        let mut stdout = Vec::new();
        let mut stderr = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    stdout.extend_from_slice(&message);
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdIn { .. }) => {}
                Err(err) => return Err(Error::from_daemon(err)),
            }
        }

        Ok((stdout, stderr))
    }

    pub(super) async fn force_remove_container(&self, container_id: &str) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::new().force(true).build();
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(Error::from_daemon)
    }
}

fn health_string(state: Option<&ContainerState>) -> String {
    state
        .and_then(|state| state.health.as_ref())
        .and_then(|health| health.status)
        .filter(|status| *status != HealthStatusEnum::EMPTY)
        .map(|status| status.to_string())
        .unwrap_or_else(|| HEALTH_NONE.to_owned())
}

fn restart_policy(policy: &bollard::models::RestartPolicy) -> Option<RestartPolicy> {
    let name = policy.name?;
    if name == RestartPolicyNameEnum::EMPTY {
        return None;
    }
    Some(RestartPolicy {
        name: name.to_string(),
        maximum_retry_count: policy.maximum_retry_count,
    })
}

fn port_bindings(ports: Option<&bollard::models::PortMap>) -> Vec<PortBinding> {
    let mut out = Vec::new();
    let Some(ports) = ports else {
        return out;
    };
    for (container_port, bindings) in ports {
        match bindings {
            Some(bindings) if !bindings.is_empty() => {
                for binding in bindings {
                    out.push(PortBinding {
                        container_port: container_port.clone(),
                        host_ip: binding.host_ip.clone(),
                        host_port: binding.host_port.clone(),
                    });
                }
            }
            // Exposed but not bound to any host address.
            _ => out.push(PortBinding {
                container_port: container_port.clone(),
                host_ip: None,
                host_port: None,
            }),
        }
    }
    out
}

/// Sorts volumes by creation time, newest first. Entries whose timestamp
/// fails to parse sort last, ordered among themselves by name.
fn sort_volumes(volumes: &mut [VolumeSummary]) {
    use std::cmp::Ordering;

    volumes.sort_by(|a, b| {
        let created_a = chrono::DateTime::parse_from_rfc3339(&a.created_at).ok();
        let created_b = chrono::DateTime::parse_from_rfc3339(&b.created_at).ok();
        match (created_a, created_b) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(name: &str, created_at: &str) -> VolumeSummary {
        VolumeSummary {
            name: name.to_owned(),
            driver: "local".to_owned(),
            mountpoint: format!("/var/lib/docker/volumes/{name}/_data"),
            created_at: created_at.to_owned(),
            scope: "local".to_owned(),
            containers: Vec::new(),
        }
    }

    #[test]
    fn test_sort_volumes_newest_first() {
        let mut volumes = vec![
            volume("old", "2024-01-01T00:00:00.000000000Z"),
            volume("new", "2025-06-01T12:30:00.123456789Z"),
            volume("mid", "2025-01-01T00:00:00Z"),
        ];
        sort_volumes(&mut volumes);
        let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["new", "mid", "old"]);
    }

    #[test]
    fn test_sort_volumes_unparsable_last_by_name() {
        let mut volumes = vec![
            volume("zeta", "not-a-timestamp"),
            volume("alpha", ""),
            volume("parsed", "2025-01-01T00:00:00Z"),
        ];
        sort_volumes(&mut volumes);
        let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["parsed", "alpha", "zeta"]);
    }

    #[test]
    fn test_short_id_truncates() {
        let full = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";
        assert_eq!(short_id(full), "abcdef012345");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_port_bindings_unbound_port() {
        let mut ports = bollard::models::PortMap::new();
        ports.insert("80/tcp".to_owned(), None);
        let out = port_bindings(Some(&ports));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].container_port, "80/tcp");
        assert!(out[0].host_ip.is_none());
        assert!(out[0].host_port.is_none());
    }

    #[test]
    fn test_port_bindings_bound_pairs() {
        let mut ports = bollard::models::PortMap::new();
        ports.insert(
            "443/tcp".to_owned(),
            Some(vec![
                bollard::models::PortBinding {
                    host_ip: Some("0.0.0.0".to_owned()),
                    host_port: Some("8443".to_owned()),
                },
                bollard::models::PortBinding {
                    host_ip: Some("::".to_owned()),
                    host_port: Some("8443".to_owned()),
                },
            ]),
        );
        let out = port_bindings(Some(&ports));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.container_port == "443/tcp"));
        assert!(out.iter().all(|p| p.host_port.as_deref() == Some("8443")));
    }
}
