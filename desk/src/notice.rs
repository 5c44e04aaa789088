//! User facing notices
//!
//! Notices are shown without blocking the page. Their text is always one of the fixed messages
//! below - technical details of failures only go to the logs.

use crate::backend::{ErrorKind, RequestError};
use crate::panel::PanelId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SignedUp,
    LoginFailed(&'static str),
    SignupFailed(&'static str),
    PanelUnavailable(PanelId),
    SyncFailed,
    SessionExpired,
}

impl Notice {
    pub fn login_failed(err: &RequestError) -> Self {
        let message = match err.kind() {
            Some(ErrorKind::NotFound) => "No account with that username.",
            Some(ErrorKind::InvalidPassword) => "Incorrect password.",
            Some(ErrorKind::InvalidCredentials) => "Invalid username or password.",
            Some(ErrorKind::ValidationError) => "Please enter your username and password.",
            _ => generic_message(err),
        };
        Self::LoginFailed(message)
    }

    pub fn signup_failed(err: &RequestError) -> Self {
        let message = match err.kind() {
            Some(ErrorKind::DuplicateUsername) => "Username already exists.",
            Some(ErrorKind::ValidationError) => "Please choose a valid username and password.",
            _ => generic_message(err),
        };
        Self::SignupFailed(message)
    }

    /// Text displayed to the user
    pub fn message(&self) -> String {
        match self {
            Self::SignedUp => "Signup successful!".to_owned(),
            Self::LoginFailed(message) | Self::SignupFailed(message) => (*message).to_owned(),
            Self::PanelUnavailable(panel) => format!("Could not open {panel}. Please try again."),
            Self::SyncFailed => "Your open windows could not be saved.".to_owned(),
            Self::SessionExpired => "Your session has expired. Please log in again.".to_owned(),
        }
    }
}

fn generic_message(err: &RequestError) -> &'static str {
    if err.is_network() {
        "Could not reach the server. Please try again."
    } else {
        "Something went wrong. Please try again later."
    }
}
