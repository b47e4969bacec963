use thiserror::Error;

use shared_models::error::ClientError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl AuthError {
    /// HTTP-like status for display, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Validation(_) => None,
            AuthError::InvalidCredentials => Some(401),
            AuthError::Client(e) => e.status(),
        }
    }
}
