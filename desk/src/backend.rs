//! Desk service API seen from the client

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::panel::PanelId;

/// Kind of error reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ErrorKind {
    DuplicateUsername,
    NotFound,
    InvalidPassword,
    InvalidCredentials,
    Unauthorized,
    ValidationError,
    Internal,
    #[serde(other)]
    Other,
}

impl ErrorKind {
    /// Best guess of the error kind when the response carries no error body
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::ValidationError,
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            409 => Self::DuplicateUsername,
            500..=599 => Self::Internal,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    /// The service couldn't be reached. Worth retrying.
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Request rejected with {status}: {kind:?}")]
    Rejected { status: u16, kind: ErrorKind },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl RequestError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Session token held by the client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Username and password pair
///
/// The password never shows up in `Debug` output.
#[derive(Clone, Serialize, Derivative)]
#[derivative(Debug)]
pub struct Credentials {
    pub username: String,
    #[derivative(Debug = "ignore")]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_token: SessionToken,
    pub user_id: i64,
    /// Panels to reopen, in the order they were opened
    #[serde(default)]
    pub open_windows: Vec<PanelId>,
}

/// User owning a session
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: i64,
    pub username: String,
}

/// Panels stored for the session user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWindows {
    #[serde(default)]
    pub open_windows: Vec<PanelId>,
    /// Sequence number of the last report applied through the session
    #[serde(default)]
    pub seq: i64,
}

/// Open windows report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowsReport {
    pub open_windows: Vec<PanelId>,
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAck {
    /// `false` if the service already applied a newer report
    pub applied: bool,
    pub seq: i64,
}

/// Desk service operations
///
/// Futures are not required to be `Send` - the controller runs on a single task.
#[allow(async_fn_in_trait)]
pub trait Backend {
    async fn signup(&self, credentials: &Credentials) -> Result<SignupResponse, RequestError>;

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, RequestError>;

    async fn logout(&self, token: &SessionToken) -> Result<(), RequestError>;

    /// Fails with `Unauthorized` if the session is gone
    async fn current_user(&self, token: &SessionToken) -> Result<CurrentUser, RequestError>;

    async fn stored_windows(&self, token: &SessionToken) -> Result<StoredWindows, RequestError>;

    async fn report_windows(
        &self,
        token: &SessionToken,
        report: &WindowsReport,
    ) -> Result<ReportAck, RequestError>;

    /// Fetches the panel markup fragment
    async fn fetch_fragment(&self, panel: &PanelId) -> Result<String, RequestError>;
}

/// Runs the request, retrying once if it failed on the network
pub(crate) async fn with_retry<T, F, Fut>(mut request: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    match request().await {
        Err(err) if err.is_network() => {
            tracing::debug!(error = %err, "Request failed, retrying");
            request().await
        }
        result => result,
    }
}
