use axum::extract::{Path, Query, State};
use axum::response::Response;

use super::models::VolumePathParams;
use super::{AppState, docker_error, explorer_error, ok, ok_message};

pub async fn list_volumes(State(state): State<AppState>) -> Response {
    match state.manager.list_volumes().await {
        Ok(volumes) => ok(volumes),
        Err(err) => docker_error("failed to list volumes", err),
    }
}

/// Deletes a volume. The daemon answers 409 for volumes still mounted
/// by a container, which passes through to the client.
pub async fn remove_volume(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.manager.remove_volume(&name).await {
        Ok(()) => ok_message("volume removed"),
        Err(err) => docker_error("failed to remove volume", err),
    }
}

/// Lists a directory inside a volume, defaulting to the volume root.
pub async fn list_volume_files(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<VolumePathParams>,
) -> Response {
    let image = state.settings.explorer_image().await;
    match state.manager.explore_volume(&image, &name, &params.path).await {
        Ok(entries) => ok(entries),
        Err(err) => explorer_error("failed to list volume files", err),
    }
}

pub async fn read_volume_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<VolumePathParams>,
) -> Response {
    let image = state.settings.explorer_image().await;
    match state
        .manager
        .read_volume_file(&image, &name, &params.path)
        .await
    {
        Ok(content) => ok(content),
        Err(err) => explorer_error("failed to read volume file", err),
    }
}
