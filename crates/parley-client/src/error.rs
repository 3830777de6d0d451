use parley_gateway::StoreError;
use parley_types::models::DocumentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Input rejected before reaching the store. The message is user-facing.
    #[error("{0}")]
    Validation(&'static str),

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Unable to sign in.")]
    InvalidCredentials,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("No user available")]
    NoUsersAvailable,

    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error("Chat session is closed")]
    SessionClosed,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Preference file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preference file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
