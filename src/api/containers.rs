use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::Response;

use crate::docker::logstream;

use super::models::{DockerHealthResponse, LogStreamParams};
use super::{AppState, docker_error, ok, ok_message};

pub async fn list_containers(State(state): State<AppState>) -> Response {
    match state.manager.list_containers().await {
        Ok(containers) => ok(containers),
        Err(err) => docker_error("failed to list containers", err),
    }
}

pub async fn container_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.container_detail(&id).await {
        Ok(detail) => ok(detail),
        Err(err) => docker_error("failed to inspect container", err),
    }
}

pub async fn start_container(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.manager.start_container(&id).await {
        Ok(()) => ok_message("container started"),
        Err(err) => docker_error("failed to start container", err),
    }
}

pub async fn stop_container(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.manager.stop_container(&id).await {
        Ok(()) => ok_message("container stopped"),
        Err(err) => docker_error("failed to stop container", err),
    }
}

pub async fn restart_container(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.manager.restart_container(&id).await {
        Ok(()) => ok_message("container restarted"),
        Err(err) => docker_error("failed to restart container", err),
    }
}

/// Upgrades to a WebSocket and streams the container's log lines.
///
/// The stream starts with the most recent lines and, unless
/// `follow=false`, keeps following live output until either side goes
/// away.
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LogStreamParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let follow = params.follow.unwrap_or(true);
    let logs = state.manager.stream_logs(&id, follow).await;
    ws.on_upgrade(move |socket| logstream::run(socket, logs))
}

/// Reports whether the daemon answers on the active socket, plus the
/// detected self identity.
pub async fn docker_health(State(state): State<AppState>) -> Response {
    let connected = match state.manager.ping().await {
        Ok(()) => true,
        Err(err) => {
            log::warn!("docker health check failed: {err}");
            false
        }
    };
    let identity = state.manager.identity();
    ok(DockerHealthResponse {
        connected,
        socket_path: state.manager.socket_path().await,
        in_container: identity.in_container,
        container_id: identity.container_id.clone(),
    })
}
