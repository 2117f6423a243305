/// Core error type for the admin console.
///
/// Adapter crates (storage, transport) map their specific errors into this type so the
/// dispatcher can decide consistently what the sender sees and what only the operator sees.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("duplicate value: {0}")]
    Conflict(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// A handler panicked; the payload text is kept for the logs.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Text that may be shown to the sender as-is.
    ///
    /// Storage and transport details stay in the logs; callers fall back to a generic notice.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument(m) | Self::NotFound(m) | Self::Conflict(m) => Some(m),
            _ => None,
        }
    }

    /// Whether the operator channel should hear about this failure.
    pub fn notifies_operator(&self) -> bool {
        self.user_message().is_none()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
