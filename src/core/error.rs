use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarineError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {message}")]
    Persistence { message: String, transient: bool },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MarineError>;

impl MarineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Gateway failure that may clear up on its own (store offline, file busy).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            transient: true,
        }
    }

    /// Gateway failure that retrying cannot fix (corrupt journal, bad schema).
    pub fn fatal_persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence { transient: true, .. })
    }

    /// True for failures of the byte stream itself; the peer is gone or unusable.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

impl From<rmp_serde::encode::Error> for MarineError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Protocol(format!("failed to encode message: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for MarineError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Protocol(format!("failed to decode message: {}", err))
    }
}

impl From<serde_json::Error> for MarineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Execution(format!("failed to render JSON: {}", err))
    }
}

impl From<bcrypt::BcryptError> for MarineError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Auth(format!("password hashing failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for MarineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MarineError::unavailable("offline").is_transient());
        assert!(!MarineError::fatal_persistence("corrupt").is_transient());
        assert!(!MarineError::validation("bad id").is_transient());
    }

    #[test]
    fn test_disconnect_classification() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(MarineError::from(eof).is_disconnect());
        assert!(MarineError::Connection("refused".into()).is_disconnect());
        assert!(!MarineError::protocol("garbage").is_disconnect());
    }
}
