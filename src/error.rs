use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Log record not found: {0}")]
    LogNotFound(i64),

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
