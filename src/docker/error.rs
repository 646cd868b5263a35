/// Errors produced by the Docker client and manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("docker daemon unavailable: {0}")]
    Unavailable(#[source] bollard::errors::Error),
    #[error("docker daemon returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("cannot stop or restart the container running this application")]
    SelfOperationDenied,
}

impl Error {
    /// Maps a raw bollard error onto the client taxonomy.
    ///
    /// A 404 from the daemon means the container or volume id did not
    /// resolve; any other daemon status is carried through verbatim, and
    /// everything else (socket connect failures, I/O, protocol errors) is
    /// treated as the daemon being unreachable.
    pub(super) fn from_daemon(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => Error::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Error::Api {
                status: status_code,
                message,
            },
            other => Error::Unavailable(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
