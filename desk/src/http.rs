//! HTTP backend of the desk service

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::backend::{
    Backend, Credentials, CurrentUser, ErrorKind, LoginResponse, ReportAck, RequestError,
    SessionToken, SignupResponse, StoredWindows, WindowsReport,
};
use crate::panel::PanelId;

/// Error payload sent by the service
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorKind,
}

/// Desk service reached over HTTP
///
/// Session token is passed in the `Authorization: Session [token]` header.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    /// Service root, also serving panel fragments
    base: Url,
}

impl HttpBackend {
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    fn url(&self, path: &str) -> Result<Url, RequestError> {
        self.base
            .join(path)
            .map_err(|err| RequestError::Malformed(err.to_string()))
    }

    fn authorized(request: RequestBuilder, token: &SessionToken) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Session {}", token.as_str()))
    }

    async fn send(request: RequestBuilder) -> Result<Response, RequestError> {
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let kind = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => ErrorKind::from_status(status.as_u16()),
        };
        Err(RequestError::Rejected {
            status: status.as_u16(),
            kind,
        })
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RequestError> {
        Self::send(request)
            .await?
            .json()
            .await
            .map_err(transport_error)
    }
}

/// Failures to deliver the request are worth retrying, anything else is not
fn transport_error(err: reqwest::Error) -> RequestError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        RequestError::Network(err.to_string())
    } else {
        RequestError::Malformed(err.to_string())
    }
}

impl Backend for HttpBackend {
    async fn signup(&self, credentials: &Credentials) -> Result<SignupResponse, RequestError> {
        let request = self.client.post(self.url("signup")?).json(credentials);
        Self::send_json(request).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, RequestError> {
        let request = self.client.post(self.url("login")?).json(credentials);
        Self::send_json(request).await
    }

    async fn logout(&self, token: &SessionToken) -> Result<(), RequestError> {
        let request = Self::authorized(self.client.post(self.url("logout")?), token);
        Self::send(request).await.map(drop)
    }

    async fn current_user(&self, token: &SessionToken) -> Result<CurrentUser, RequestError> {
        let request = Self::authorized(self.client.get(self.url("session")?), token);
        Self::send_json(request).await
    }

    async fn stored_windows(&self, token: &SessionToken) -> Result<StoredWindows, RequestError> {
        let request = Self::authorized(self.client.get(self.url("windows")?), token);
        Self::send_json(request).await
    }

    async fn report_windows(
        &self,
        token: &SessionToken,
        report: &WindowsReport,
    ) -> Result<ReportAck, RequestError> {
        let request = Self::authorized(self.client.post(self.url("update-windows")?), token)
            .json(report);
        Self::send_json(request).await
    }

    async fn fetch_fragment(&self, panel: &PanelId) -> Result<String, RequestError> {
        let request = self.client.get(self.url(&panel.fragment_path())?);
        Self::send(request)
            .await?
            .text()
            .await
            .map_err(transport_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_relative_to_base() {
        let backend = HttpBackend::new("http://localhost:3030/desk/".parse().unwrap());

        assert_eq!(
            backend.url("update-windows").unwrap().as_str(),
            "http://localhost:3030/desk/update-windows"
        );
        assert_eq!(
            backend
                .url(&PanelId::new("chat").fragment_path())
                .unwrap()
                .as_str(),
            "http://localhost:3030/desk/chat.html"
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_network_failure() {
        // Port freed right away, so nothing listens there
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let backend = HttpBackend::new(format!("http://127.0.0.1:{port}/").parse().unwrap());

        let err = backend
            .fetch_fragment(&PanelId::new("chat"))
            .await
            .unwrap_err();
        assert!(err.is_network());
    }
}
