use std::sync::Arc;

/// Deckhand: a small management daemon for a Docker host. It exposes
/// containers, their logs and named volumes over an authenticated HTTP
/// API, can follow logs live over WebSockets, and inspects volume
/// contents through short-lived helper containers.
pub mod api;
pub mod docker;
pub mod error;
pub mod fsutil;
pub mod persistence;
pub mod settings;

const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
const DEFAULT_EXPLORER_IMAGE: &str = "alpine:latest";
const DEFAULT_DATABASE_URL: &str = "sqlite://deckhand.db";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Runs the Deckhand daemon until the API server stops.
///
/// Brings up the SQLite store (running migrations), loads settings,
/// connects the Docker manager with self-detection, wires the settings
/// manager to hot-swap the Docker socket, and serves the HTTP API.
///
/// # Errors
///
/// Possible errors include:
/// - Failure to open or migrate the database.
/// - An invalid Docker socket path.
/// - Failure to bind the listen address.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = std::env::var("DECKHAND_DATABASE_URL")
        .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned());
    let store = persistence::SqliteStore::connect(&database_url).await?;

    let defaults = settings::Defaults {
        docker_socket: std::env::var("DECKHAND_DOCKER_SOCKET")
            .unwrap_or_else(|_| DEFAULT_DOCKER_SOCKET.to_owned()),
        disable_registration: std::env::var("DECKHAND_DISABLE_REGISTRATION")
            .map(|value| matches!(value.trim(), "true" | "1" | "yes"))
            .unwrap_or(false),
        explorer_image: std::env::var("DECKHAND_EXPLORER_IMAGE")
            .unwrap_or_else(|_| DEFAULT_EXPLORER_IMAGE.to_owned()),
    };
    let mut settings = settings::SettingsManager::load(store.clone(), defaults).await?;

    let identity = docker::detect();
    match &identity.container_id {
        Some(id) => log::info!("running inside container `{id}`"),
        None if identity.in_container => {
            log::info!("running inside a container with unknown id");
        }
        None => log::debug!("running directly on the host"),
    }

    let manager = Arc::new(docker::Manager::new(
        settings.docker_socket().await,
        identity,
    )?);
    if let Err(err) = manager.ping().await {
        log::warn!("docker daemon not reachable at startup: {err}");
    }

    {
        let manager = Arc::clone(&manager);
        settings.on_socket_change(Box::new(move |socket_path| {
            let manager = Arc::clone(&manager);
            Box::pin(async move { manager.restart_with_socket(socket_path).await })
        }));
    }
    let settings = Arc::new(settings);

    let jwt_secret = std::env::var("DECKHAND_JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("DECKHAND_JWT_SECRET not set; sessions will not survive a restart");
        random_secret()
    });

    let state = api::AppState {
        manager,
        store,
        settings,
        auth: api::auth::Authenticator::new(jwt_secret.as_bytes()),
    };

    let listen_addr = std::env::var("DECKHAND_LISTEN_ADDR")
        .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_owned());
    let server = api::ApiServer::new(state);
    server.listen(listen_addr).await?;
    Ok(())
}

fn random_secret() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("ephemeral-{}-{nanos}", std::process::id())
}
