use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("Host key error: {0}")]
    HostKey(#[from] russh_keys::Error),

    #[error("Could not generate an ed25519 host key")]
    KeyGeneration,

    #[error("Invalid auth pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
