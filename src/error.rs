use thiserror::Error;

#[derive(Error, Debug)]
pub enum KmdError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DRM Driver Error: {0}")]
    Driver(i32),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Synchronization object wait failed")]
    WaitFailed,
}

// A convenient alias
pub type KmdResult<T> = Result<T, KmdError>;
