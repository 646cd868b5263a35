/// Entry point for the Deckhand Docker management daemon.
///
/// Serves an authenticated HTTP API for managing containers and
/// volumes on a Docker host, streaming container logs over WebSockets
/// and browsing volume contents through short-lived helper containers.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., the database cannot
/// be opened or the listen address cannot be bound).
///
/// # Examples
///
/// ```bash
/// DECKHAND_DOCKER_SOCKET=/var/run/docker.sock cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    deckhand::run().await
}
