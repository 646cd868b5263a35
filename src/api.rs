use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use tokio::net::ToSocketAddrs;

use crate::docker::{self, explorer};
use crate::persistence::SqliteStore;
use crate::settings::SettingsManager;

use models::ApiResponse;

pub mod auth;
mod containers;
mod models;
mod settings;
mod users;
mod volumes;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<docker::Manager>,
    pub store: SqliteStore,
    pub settings: Arc<SettingsManager<SqliteStore>>,
    pub auth: auth::Authenticator,
}

pub struct ApiServer {
    router: axum::Router,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: router(state),
        }
    }

    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service()).await
    }
}

/// Builds the full route table. Everything except login and
/// registration sits behind the token check.
fn router(state: AppState) -> axum::Router {
    let protected = axum::Router::new()
        .route("/containers", get(containers::list_containers))
        .route("/containers/{id}", get(containers::container_detail))
        .route("/containers/{id}/start", post(containers::start_container))
        .route("/containers/{id}/stop", post(containers::stop_container))
        .route(
            "/containers/{id}/restart",
            post(containers::restart_container),
        )
        .route("/containers/{id}/logs/stream", get(containers::stream_logs))
        .route("/docker/health", get(containers::docker_health))
        .route("/volumes", get(volumes::list_volumes))
        .route("/volumes/{name}", delete(volumes::remove_volume))
        .route("/volumes/{name}/files", get(volumes::list_volume_files))
        .route("/volumes/{name}/file", get(volumes::read_volume_file))
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route(
            "/settings/docker-socket",
            put(settings::update_docker_socket),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/me", get(users::me))
        .route("/users/password", put(users::change_password))
        .route("/users/{id}", delete(users::delete_user))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let api = axum::Router::new()
        .route("/health", get(health))
        .route("/settings/public", get(settings::public_settings))
        .route("/auth/login", post(users::login))
        .route("/auth/register", post(users::register))
        .merge(protected)
        .with_state(state);

    axum::Router::new()
        .nest("/api", api)
        .layer(axum::middleware::from_fn(log_request))
}

/// Access-log line per request: method, path, status, elapsed time.
async fn log_request(request: axum::extract::Request, next: axum::middleware::Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = std::time::Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{method} {path} {} {}ms",
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}

/// Unauthenticated liveness probe.
async fn health() -> Response {
    ok_message("ok")
}

pub(crate) fn ok<T: serde::Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }),
    )
        .into_response()
}

pub(crate) fn ok_message(message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::<()> {
            success: true,
            message: Some(message.into()),
            data: None,
        }),
    )
        .into_response()
}

pub(crate) fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            message: Some(message.into()),
            data: None,
        }),
    )
        .into_response()
}

/// Maps docker errors onto HTTP statuses: unknown ids become 404,
/// self-protection becomes 403, an unreachable daemon becomes 503, and
/// daemon statuses (e.g. 409 for an in-use volume) pass through.
fn docker_error(context: &str, err: docker::Error) -> Response {
    log::error!("{context}: {err}");
    let status = match &err {
        docker::Error::NotFound(_) => StatusCode::NOT_FOUND,
        docker::Error::SelfOperationDenied => StatusCode::FORBIDDEN,
        docker::Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        docker::Error::Api { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    fail(status, err.to_string())
}

fn explorer_error(context: &str, err: explorer::Error) -> Response {
    log::error!("{context}: {err}");
    fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
async fn test_state() -> (AppState, tempfile::TempDir) {
    use crate::docker::SelfIdentity;
    use crate::settings::Defaults;

    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = tmp.path().join("test.db");
    std::fs::File::create(&db_path).expect("failed to create temp db file");
    let url = format!("sqlite://{}", db_path.display());
    let store = SqliteStore::connect(&url)
        .await
        .expect("failed to open test database");
    let defaults = Defaults {
        docker_socket: "/nonexistent/docker.sock".to_owned(),
        disable_registration: false,
        explorer_image: "alpine:latest".to_owned(),
    };
    let settings = SettingsManager::load(store.clone(), defaults)
        .await
        .expect("failed to load settings");
    let socket_path = tmp.path().join("docker.sock");
    std::fs::File::create(&socket_path).expect("failed to create socket placeholder");
    let socket_path = socket_path.to_str().expect("utf-8 temp path");
    let manager = docker::Manager::new(socket_path, SelfIdentity::default())
        .expect("lazy connect should succeed");

    let state = AppState {
        manager: Arc::new(manager),
        store,
        settings: Arc::new(settings),
        auth: auth::Authenticator::new(b"test-secret"),
    };
    (state, tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_error_status_mapping() {
        let cases = [
            (
                docker_error("t", docker::Error::NotFound("gone".to_owned())),
                StatusCode::NOT_FOUND,
            ),
            (
                docker_error("t", docker::Error::SelfOperationDenied),
                StatusCode::FORBIDDEN,
            ),
            (
                docker_error(
                    "t",
                    docker::Error::Api {
                        status: 409,
                        message: "volume is in use".to_owned(),
                    },
                ),
                StatusCode::CONFLICT,
            ),
        ];
        for (response, expected) in cases {
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_fail_envelope_shape() {
        let response = fail(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
