use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DeskErrorType {
    NotFound,
    NameConflict,
    InvalidPath,
    InvalidOperation,
    CompileError,
    PersistenceError,
    BadRequest,
    InternalError,
}

impl Into<warp::http::StatusCode> for DeskErrorType {
    fn into(self) -> warp::http::StatusCode {
        match self {
            DeskErrorType::NotFound => warp::http::StatusCode::NOT_FOUND,
            DeskErrorType::NameConflict => warp::http::StatusCode::CONFLICT,
            DeskErrorType::InvalidPath => warp::http::StatusCode::BAD_REQUEST,
            DeskErrorType::BadRequest => warp::http::StatusCode::BAD_REQUEST,
            DeskErrorType::InvalidOperation => warp::http::StatusCode::UNPROCESSABLE_ENTITY,
            DeskErrorType::CompileError => warp::http::StatusCode::UNPROCESSABLE_ENTITY,
            _ => warp::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DeskError {
    pub(crate) error_type: DeskErrorType,
    pub(crate) message: String,
}

impl warp::Reply for DeskError {
    fn into_response(self) -> warp::reply::Response {
        warp::reply::with_status(warp::reply::json(&self.message), self.error_type.into())
            .into_response()
    }
}

impl DeskError {
    pub(crate) fn new(error_type: DeskErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(DeskErrorType::NotFound, message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::new(DeskErrorType::NameConflict, message.into())
    }

    pub(crate) fn invalid_path(message: impl Into<String>) -> Self {
        Self::new(DeskErrorType::InvalidPath, message.into())
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(DeskErrorType::InvalidOperation, message.into())
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        Self::new(DeskErrorType::PersistenceError, message.into())
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(DeskErrorType::BadRequest, message.into())
    }
}

impl std::fmt::Display for DeskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error_type, self.message)
    }
}

impl From<std::io::Error> for DeskError {
    fn from(error: std::io::Error) -> Self {
        Self {
            error_type: DeskErrorType::PersistenceError,
            message: error.to_string(),
        }
    }
}

impl From<sled::Error> for DeskError {
    fn from(error: sled::Error) -> Self {
        Self {
            error_type: DeskErrorType::PersistenceError,
            message: error.to_string(),
        }
    }
}

impl From<ciborium::de::Error<std::io::Error>> for DeskError {
    fn from(error: ciborium::de::Error<std::io::Error>) -> Self {
        Self {
            error_type: DeskErrorType::PersistenceError,
            message: format!("Failed to decode stored record: {}", error),
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for DeskError {
    fn from(error: ciborium::ser::Error<std::io::Error>) -> Self {
        Self {
            error_type: DeskErrorType::PersistenceError,
            message: format!("Failed to encode record: {}", error),
        }
    }
}

impl Error for DeskError {}

pub(crate) type Result<T> = std::result::Result<T, DeskError>;
