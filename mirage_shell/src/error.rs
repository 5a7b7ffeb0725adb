use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShellError>;

#[derive(Debug, Error)]
pub enum ShellError {
    /// Peer went away or the channel failed mid-write.
    #[error("Channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}
