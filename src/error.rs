use std::fmt;

/// Status codes returned by every fallible operation in the engine.
///
/// Mirrors the code list in the interface spec: components return explicit
/// status values instead of panicking for recoverable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Error,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    IOError,
    Corruption,
    NotSupported,
    OutOfMemory,
    Busy,
    Timeout,
    Aborted,
    Internal,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "Ok",
            StatusCode::Error => "Error",
            StatusCode::NotFound => "NotFound",
            StatusCode::AlreadyExists => "AlreadyExists",
            StatusCode::InvalidArgument => "InvalidArgument",
            StatusCode::IOError => "IOError",
            StatusCode::Corruption => "Corruption",
            StatusCode::NotSupported => "NotSupported",
            StatusCode::OutOfMemory => "OutOfMemory",
            StatusCode::Busy => "Busy",
            StatusCode::Timeout => "Timeout",
            StatusCode::Aborted => "Aborted",
            StatusCode::Internal => "Internal",
        };
        write!(f, "{}", name)
    }
}

/// A status code paired with a human-readable message.
///
/// `to_string()` yields `"Code: message"`, with no trailing `:` when the
/// message is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Status {
        Status {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Status {
        Status::new(StatusCode::Ok, "")
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn not_found(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::NotFound, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::AlreadyExists, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::InvalidArgument, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::IOError, msg)
    }

    pub fn corruption(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::Corruption, msg)
    }

    pub fn not_supported(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::NotSupported, msg)
    }

    pub fn busy(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::Busy, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::Timeout, msg)
    }

    pub fn aborted(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::Aborted, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Status {
        Status::new(StatusCode::Internal, msg)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for Status {}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Status {
        Status::io_error(err.to_string())
    }
}

/// Crate-wide result alias. Named `DbResult` (rather than `Result`) so it
/// does not collide with the public row-set `Result` exposed by the
/// `Database` surface.
pub type DbResult<T> = std::result::Result<T, Status>;
