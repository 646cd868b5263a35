use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use crate::settings;

use super::models::{
    PublicSettingsResponse, SettingsResponse, UpdateSettingsRequest, UpdateSocketRequest,
};
use super::{AppState, docker_error, fail, ok, ok_message};

/// Unauthenticated view of the settings a login page needs, currently
/// just whether new accounts can be registered.
pub async fn public_settings(State(state): State<AppState>) -> Response {
    ok(PublicSettingsResponse {
        registration_enabled: !state.settings.disable_registration().await,
    })
}

pub async fn get_settings(State(state): State<AppState>) -> Response {
    ok(SettingsResponse {
        docker_socket: state.settings.docker_socket().await,
        disable_registration: state.settings.disable_registration().await,
        explorer_image: state.settings.explorer_image().await,
    })
}

/// Switches the manager to a new docker socket and persists the path.
/// A socket that does not answer leaves the current connection and the
/// stored path untouched.
pub async fn update_docker_socket(
    State(state): State<AppState>,
    Json(request): Json<UpdateSocketRequest>,
) -> Response {
    match state.settings.set_docker_socket(request.socket_path).await {
        Ok(()) => ok_message("docker socket updated"),
        Err(settings::Error::SocketSwap(err)) => {
            docker_error("failed to switch docker socket", err)
        }
        Err(err @ settings::Error::Persist(_)) => {
            log::error!("failed to persist docker socket: {err}");
            fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Response {
    if let Some(disabled) = request.disable_registration {
        if let Err(err) = state.settings.set_disable_registration(disabled).await {
            log::error!("failed to update registration setting: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    }
    if let Some(image) = request.explorer_image {
        if image.trim().is_empty() {
            return fail(StatusCode::BAD_REQUEST, "explorer image must not be empty");
        }
        if let Err(err) = state.settings.set_explorer_image(image).await {
            log::error!("failed to update explorer image: {err}");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    }
    ok_message("settings updated")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_public_settings_reflect_registration_toggle() {
        let (state, _tmp) = super::super::test_state().await;

        let open = public_settings(State(state.clone())).await;
        assert_eq!(open.status(), StatusCode::OK);
        let body = body_json(open).await;
        assert_eq!(body["data"]["registration_enabled"], true);

        state.settings.set_disable_registration(true).await.unwrap();
        let closed = public_settings(State(state.clone())).await;
        let body = body_json(closed).await;
        assert_eq!(body["data"]["registration_enabled"], false);
    }
}
