//! HTTP API

use actix_web::web::{self, Data, Json, ServiceConfig};
use actix_web::{HttpRequest, HttpResponse, get, middleware, post};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

#[cfg(test)]
mod tests;

mod error;
mod session;

use crate::config;
use crate::model::Model;
use crate::model::session::SessionToken;
use crate::model::users::{Credentials, User, UserId};
use crate::model::windows::{OpenWindows, PanelId, Report, SessionWindows};

use error::ApiError;

/// Service settings shared by the handlers
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub auth: config::Auth,
    pub panels: config::Panels,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedUp {
    user_id: UserId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoggedIn {
    session_token: SessionToken,
    user_id: UserId,
    open_windows: OpenWindows,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUser {
    user_id: UserId,
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowsReport {
    open_windows: Vec<PanelId>,
    #[serde(default)]
    seq: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowsReported {
    /// If `false` the report was stale and got discarded
    applied: bool,
    /// Sequence number of the last applied report
    seq: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredWindows {
    open_windows: OpenWindows,
    /// Sequence number of the last report applied through this session
    seq: i64,
}

/// Creates a new user
#[post("/signup")]
#[instrument(skip(model))]
async fn signup(
    model: Data<Model>,
    credentials: Json<Credentials>,
) -> Result<HttpResponse, ApiError> {
    let user_id = credentials.create_user(model.db()).await?;
    info!(%user_id, "User signed up");

    Ok(HttpResponse::Created().json(SignedUp { user_id }))
}

/// Opens a new session, returning the open windows to restore
#[post("/login")]
#[instrument(skip(model, settings))]
async fn login(
    model: Data<Model>,
    settings: Data<Settings>,
    credentials: Json<Credentials>,
) -> Result<HttpResponse, ApiError> {
    let db = model.db();

    let user_id = match credentials.verify(db).await {
        Ok(user_id) => user_id,
        Err(err) => {
            let err = ApiError::from(err);
            info!(error = %err, "Login rejected");
            return Err(if settings.auth.unify_credential_errors {
                err.unify_credentials()
            } else {
                err
            });
        }
    };

    let session = user_id
        .create_session(db, settings.auth.session_ttl())
        .await?;
    let open_windows = OpenWindows::fetch(db, user_id).await?;
    info!(%user_id, session = %session.id, "User logged in");

    Ok(HttpResponse::Ok()
        .cookie(session::cookie(&session, settings.auth.secure_cookie))
        .json(LoggedIn {
            session_token: session.token,
            user_id,
            open_windows,
        }))
}

/// Closes current session
///
/// Logging out without a session is a no-op.
#[post("/logout")]
#[instrument(skip_all)]
async fn logout(req: HttpRequest, model: Data<Model>) -> Result<HttpResponse, ApiError> {
    if let Ok(session) = session::current(&req) {
        session.destroy(model.db()).await?;
        info!(user_id = %session.user_id, session = %session.id, "User logged out");
    }

    Ok(HttpResponse::Ok()
        .cookie(session::removal_cookie())
        .finish())
}

/// Returns the user owning current session
#[get("/session")]
#[instrument(skip_all)]
async fn current_user(req: HttpRequest, model: Data<Model>) -> Result<HttpResponse, ApiError> {
    let session = session::current(&req)?;
    let user = User::fetch(model.db(), session.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(HttpResponse::Ok().json(CurrentUser {
        user_id: user.id,
        username: user.username,
    }))
}

/// Replaces the open windows of the session user
#[post("/update-windows")]
#[instrument(skip(req, model, settings))]
async fn update_windows(
    req: HttpRequest,
    model: Data<Model>,
    settings: Data<Settings>,
    report: Json<WindowsReport>,
) -> Result<HttpResponse, ApiError> {
    let session = session::current(&req)?;
    let WindowsReport { open_windows, seq } = report.into_inner();

    let open_windows = OpenWindows::from_reported(open_windows)?;
    open_windows.ensure_known(&settings.panels.known)?;

    let reported = match open_windows.report(model.db(), &session.id, seq).await? {
        Report::Applied { seq } => WindowsReported { applied: true, seq },
        Report::Stale { last_applied } => {
            warn!(session = %session.id, ?seq, last_applied, "Stale windows report discarded");
            WindowsReported {
                applied: false,
                seq: last_applied,
            }
        }
    };

    Ok(HttpResponse::Ok().json(reported))
}

/// Returns the open windows of the session user, so a reloaded client can resume the session
#[get("/windows")]
#[instrument(skip_all)]
async fn stored_windows(req: HttpRequest, model: Data<Model>) -> Result<HttpResponse, ApiError> {
    let session = session::current(&req)?;
    let SessionWindows {
        open_windows,
        last_report_seq,
    } = OpenWindows::fetch_for_session(model.db(), &session.id).await?;

    Ok(HttpResponse::Ok().json(StoredWindows {
        open_windows,
        seq: last_report_seq,
    }))
}

/// Returns configuration function for the ActixWeb services
pub fn configure(settings: Settings, model: Model) -> impl Fn(&mut ServiceConfig) + Clone {
    move |cfg: &mut ServiceConfig| {
        let session_aware = web::scope("")
            .wrap(middleware::from_fn(session::middleware))
            .service(signup)
            .service(login)
            .service(logout)
            .service(current_user)
            .service(update_windows)
            .service(stored_windows);

        cfg.app_data(Data::new(model.clone()))
            .app_data(Data::new(settings.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .service(session_aware);
    }
}
