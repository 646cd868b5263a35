use crate::persistence::PublicUser;

/// Envelope every JSON endpoint answers with.
///
/// `data` carries the payload on success; `message` carries either a
/// human-readable error or an informational note.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, serde::Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, serde::Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, serde::Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateSocketRequest {
    pub socket_path: String,
}

/// Partial settings update; absent fields stay unchanged.
#[derive(Debug, serde::Deserialize)]
pub struct UpdateSettingsRequest {
    pub disable_registration: Option<bool>,
    pub explorer_image: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct SettingsResponse {
    pub docker_socket: String,
    pub disable_registration: bool,
    pub explorer_image: String,
}

/// The settings a login page may see before authenticating.
#[derive(Debug, serde::Serialize)]
pub struct PublicSettingsResponse {
    pub registration_enabled: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct DockerHealthResponse {
    pub connected: bool,
    pub socket_path: String,
    pub in_container: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Query parameters shared by the volume file endpoints.
#[derive(Debug, serde::Deserialize)]
pub struct VolumePathParams {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct LogStreamParams {
    pub follow: Option<bool>,
}
