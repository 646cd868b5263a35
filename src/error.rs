pub trait ResultOkLogExt<T, E> {
    /// Converts the result to an [`Option`], logging the error at warn
    /// level with the given context before discarding it.
    fn ok_log_warn(self, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
