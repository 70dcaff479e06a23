//! Canonical RPC outcome codes and the error status carried by failed calls.

use std::fmt;

use reqlog_core::ContextError;

/// Canonical RPC status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Name used in access logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Canceled => "Canceled",
            Code::Unknown => "Unknown",
            Code::InvalidArgument => "InvalidArgument",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "AlreadyExists",
            Code::PermissionDenied => "PermissionDenied",
            Code::ResourceExhausted => "ResourceExhausted",
            Code::FailedPrecondition => "FailedPrecondition",
            Code::Aborted => "Aborted",
            Code::OutOfRange => "OutOfRange",
            Code::Unimplemented => "Unimplemented",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
            Code::DataLoss => "DataLoss",
            Code::Unauthenticated => "Unauthenticated",
        }
    }

    /// Classification of a call result: `Ok` on success, the status code otherwise.
    #[must_use]
    pub fn of<R>(result: &Result<R, Status>) -> Code {
        match result {
            Ok(_) => Code::Ok,
            Err(status) => status.code(),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error outcome of an RPC call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rpc error: code = {code} desc = {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    #[must_use]
    pub fn code(&self) -> Code {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ContextError> for Status {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => Status::canceled(err.to_string()),
            ContextError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
            ContextError::Unbound => Status::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_of_success_is_ok() {
        let ok: Result<u8, Status> = Ok(1);
        assert_eq!(Code::of(&ok).as_str(), "OK");
    }

    #[test]
    fn code_of_failure_is_status_code() {
        let failed: Result<u8, Status> = Err(Status::not_found("missing"));
        assert_eq!(Code::of(&failed), Code::NotFound);
    }

    #[test]
    fn context_errors_map_to_codes() {
        assert_eq!(Status::from(ContextError::DeadlineExceeded).code(), Code::DeadlineExceeded);
        assert_eq!(Status::from(ContextError::Canceled).code(), Code::Canceled);
    }

    #[test]
    fn display_includes_code_and_message() {
        let status = Status::unavailable("backend down");
        assert_eq!(status.to_string(), "rpc error: code = Unavailable desc = backend down");
    }
}
