use std::collections::HashMap;

/// Summary of a container as returned by the list endpoint.
///
/// Constructed fresh on every call and never cached; `id` is always the
/// short 12-character form.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub health: String,
    pub created: i64,
    pub is_self: bool,
    pub compose_project: String,
    pub compose_service: String,
}

/// Full container detail from a single inspect call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerDetail {
    #[serde(flatten)]
    pub summary: ContainerSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub networks: HashMap<String, NetworkAttachment>,
    pub ports: Vec<PortBinding>,
    pub mounts: Vec<MountEntry>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RestartPolicy {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_retry_count: Option<i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NetworkAttachment {
    pub network_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub gateway: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
}

/// A single port mapping; `host_ip`/`host_port` are absent for ports that
/// are exposed but not bound.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PortBinding {
    pub container_port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MountEntry {
    #[serde(rename = "type")]
    pub mount_type: String,
    pub source: String,
    pub destination: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mode: String,
    pub rw: bool,
}

/// Summary of a named volume, including the short ids of every container
/// currently mounting it (empty list, never absent).
#[derive(Debug, Clone, serde::Serialize)]
pub struct VolumeSummary {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub created_at: String,
    pub scope: String,
    pub containers: Vec<String>,
}

/// A file or directory listed inside a volume by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VolumeFileEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub mode: String,
    pub mod_time: String,
}

/// Content of a single file read out of a volume. `size` is always the
/// raw byte length; UTF-8 files are carried as plain text, anything
/// else is base64-encoded and marked via `encoding` so no byte is lost
/// in transit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VolumeFileContent {
    pub path: String,
    pub content: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}
