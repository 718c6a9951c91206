//! Storage error types.

/// Errors surfaced by [`CredentialStore`](super::CredentialStore) operations.
///
/// Expected absence (missing file, section, or entry) is never an error;
/// those cases return `Ok(None)` / `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access secrets file: {0}")]
    Io(#[from] std::io::Error),

    #[error("secrets file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize secrets document: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("credential '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },

    #[error("cannot read credential '{name}': {reason}")]
    Crypto { name: String, reason: String },
}
