use thiserror::Error;

/// Boxed error from the underlying transport.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
}

impl StreamError {
    pub fn transport(err: impl Into<TransportError>) -> Self {
        StreamError::Transport(err.into())
    }
}
