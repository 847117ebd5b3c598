use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// No explicit, persisted or default project can be launched
    Configuration(String),
    UserNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            Error::UserNotFound(user) => write!(f, "User not found: {}", user),
        }
    }
}

impl std::error::Error for Error {}

/// Returns true if the error chain carries a configuration error
pub fn is_configuration_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::Configuration(_)))
}

/// Returns true if the error chain carries an unknown-user error
pub fn is_user_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::UserNotFound(_)))
}
