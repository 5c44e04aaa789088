//! Session management

use actix_web::body::MessageBody;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::web::Data;
use actix_web::{Error, HttpMessage, HttpRequest};
use tracing::debug;

use crate::model::Model;
use crate::model::session::{Session, SessionToken};
use crate::service::error::ApiError;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "desk_session";

/// Finds the session token on the request
///
/// The `Authorization: Session [token]` header takes precedence over the session cookie.
fn session_token(req: &ServiceRequest) -> Option<SessionToken> {
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION) {
        let token = auth_header
            .to_str()
            .ok()
            .and_then(|auth_header| auth_header.parse().ok());

        if token.is_none() {
            debug!("Malformed Authorization header");
        }
        return token;
    }

    req.cookie(SESSION_COOKIE)
        .map(|cookie| SessionToken::new(cookie.value()))
}

/// Authenticates the request attaching the `Session` to its extensions
///
/// Requests without valid session are passed through - endpoints requiring a session reject
/// them on their own, while the others (like logout) treat them as anonymous.
pub async fn middleware<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error>
where
    B: MessageBody + 'static,
{
    if let Some(token) = session_token(&req) {
        let model: Option<Data<Model>> = req.app_data().cloned();

        if let Some(model) = model {
            match token.authenticate(model.db()).await {
                Ok(session) => {
                    req.extensions_mut().insert::<Session>(session);
                }
                Err(err) => debug!(error = %err, "Session authentication failed"),
            }
        }
    }

    next.call(req).await
}

/// Retrieves the session attached by the middleware
pub fn current(req: &HttpRequest) -> Result<Session, ApiError> {
    req.extensions()
        .get::<Session>()
        .cloned()
        .ok_or(ApiError::Unauthorized)
}

/// Builds the cookie carrying the session token
pub fn cookie(session: &Session, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, session.token.as_str().to_owned())
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .expires(cookie_expiry(session))
        .finish()
}

/// Builds the cookie removing the session token from the client
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

fn cookie_expiry(session: &Session) -> actix_web::cookie::Expiration {
    let timestamp = session.expires_at.timestamp();
    actix_web::cookie::time::OffsetDateTime::from_unix_timestamp(timestamp)
        .map(actix_web::cookie::Expiration::from)
        .unwrap_or(actix_web::cookie::Expiration::Session)
}
