/// Core error type for the relay.
///
/// Adapter crates map their library errors into this type so the pump can
/// decide uniformly what aborts a batch and what is merely logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Bad status or payload from the upstream bot API.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The governing cancellation token fired while waiting.
    #[error("operation canceled")]
    Canceled,

    /// Cursor or subscription persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A single recipient could not be reached.
    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Cancellation is expected during shutdown and is never logged as a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
