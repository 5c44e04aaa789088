//! Errors reported by the HTTP API

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::model::{session, users, windows};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("User not found")]
    NotFound,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    /// Anything unexpected. Details are logged, never sent to the client.
    #[error("Internal server error")]
    Internal(color_eyre::Report),
}

/// Error payload
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateUsername => "DuplicateUsername",
            Self::NotFound => "NotFound",
            Self::InvalidPassword => "InvalidPassword",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::Unauthorized => "Unauthorized",
            Self::Validation(_) => "ValidationError",
            Self::Internal(_) => "Internal",
        }
    }

    /// Hides which part of the credentials was wrong
    pub fn unify_credentials(self) -> Self {
        match self {
            Self::NotFound | Self::InvalidPassword => Self::InvalidCredentials,
            err => err,
        }
    }
}

impl From<color_eyre::Report> for ApiError {
    /// Classifies model errors
    fn from(err: color_eyre::Report) -> Self {
        let classified = match err.downcast_ref::<users::Error>() {
            Some(users::Error::DuplicateUsername) => Some(Self::DuplicateUsername),
            Some(users::Error::NotFound) => Some(Self::NotFound),
            Some(users::Error::InvalidPassword) => Some(Self::InvalidPassword),
            Some(users::Error::Validation(msg)) => Some(Self::Validation((*msg).to_owned())),
            _ => None,
        };
        if let Some(classified) = classified {
            return classified;
        }

        if let Some(windows_err) = err.downcast_ref::<windows::Error>() {
            return Self::Validation(windows_err.to_string());
        }

        if err.downcast_ref::<session::Error>().is_some() {
            return Self::Unauthorized;
        }

        Self::Internal(err)
    }
}

impl From<windows::Error> for ApiError {
    fn from(err: windows::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateUsername => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidPassword | Self::InvalidCredentials | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let Self::Internal(err) = self {
            error!(error = ?err, "Request failed");
        }

        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        })
    }
}
