//! Window controller

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{
    Backend, Credentials, ErrorKind, RequestError, SessionToken, WindowsReport, with_retry,
};
use crate::notice::Notice;
use crate::panel::{self, PanelId, Position, Rect};

/// Panel hosting the signup form, closed after successful signup
const SIGNUP_PANEL: &str = "window-signup";

const LOGOUT_QUESTION: &str = "Are you sure you want to log out?";

/// Panel markup couldn't be loaded, the panel stays closed
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Cannot load panel {panel}")]
pub struct LoadError {
    pub panel: PanelId,
    #[source]
    pub source: RequestError,
}

/// Rendering surface of the desk page
pub trait View {
    /// Area of the element the panel is opened from, if it is on the page
    fn anchor(&self, panel: &PanelId) -> Option<Rect>;

    /// Fills the panel with its markup
    fn render(&mut self, panel: &PanelId, markup: &str);

    fn place(&mut self, panel: &PanelId, at: Position);

    fn set_visible(&mut self, panel: &PanelId, visible: bool);

    /// Opens the panel in a separate window with the given markup
    fn pop_out(&mut self, panel: &PanelId, markup: &str);

    /// Shows a non-blocking notice
    fn notify(&mut self, notice: Notice);

    /// Asks the user to confirm an action
    fn confirm(&mut self, question: &str) -> bool;

    /// Navigates to the landing view
    fn show_landing(&mut self);
}

/// Who asked for the panel to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    Restore,
}

#[derive(Debug, Default)]
struct PanelState {
    /// Rendered markup, `None` until fetched
    markup: Option<String>,
    position: Position,
}

/// Client side of an authenticated session
#[derive(Debug)]
struct ClientSession {
    token: SessionToken,
    user_id: i64,
    /// Sequence number of the last report sent
    seq: i64,
}

/// Opens and closes panels keeping the server informed
///
/// Every change of the open panels made while logged in is reported to the server as a full
/// snapshot, so the panels can be restored on the next login. Anonymous users can use panels
/// too, but nothing is reported then.
pub struct WindowController<B, V> {
    backend: B,
    view: V,
    session: Option<ClientSession>,
    panels: HashMap<PanelId, PanelState>,
    /// Open panels, the last one is on top
    open: Vec<PanelId>,
    signup_panel: PanelId,
}

impl<B: Backend, V: View> WindowController<B, V> {
    pub fn new(backend: B, view: V) -> Self {
        Self {
            backend,
            view,
            session: None,
            panels: HashMap::new(),
            open: Vec::new(),
            signup_panel: PanelId::new(SIGNUP_PANEL),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Id of the logged in user
    pub fn user_id(&self) -> Option<i64> {
        self.session.as_ref().map(|session| session.user_id)
    }

    /// Open panels, bottom to top
    pub fn open_panels(&self) -> &[PanelId] {
        &self.open
    }

    pub fn is_open(&self, panel: &PanelId) -> bool {
        self.open.contains(panel)
    }

    pub fn is_loaded(&self, panel: &PanelId) -> bool {
        self.panels.get(panel).is_some_and(|state| state.markup.is_some())
    }

    pub fn position(&self, panel: &PanelId) -> Option<Position> {
        self.panels.get(panel).map(|state| state.position)
    }

    /// Opens the panel next to the anchor on user request
    ///
    /// Panel markup is fetched the first time the panel opens. If it cannot be loaded, the panel
    /// stays closed and the user is notified. Reopening an open panel brings it to the top.
    pub async fn open_panel(
        &mut self,
        panel: impl Into<PanelId>,
        anchor: Option<Rect>,
    ) -> Result<(), LoadError> {
        self.show(panel.into(), anchor, Origin::User).await
    }

    /// Closes the panel
    pub async fn close_panel(&mut self, panel: impl Into<PanelId>) {
        let panel = panel.into();
        self.view.set_visible(&panel, false);

        let before = self.open.len();
        self.open.retain(|open| *open != panel);
        if self.open.len() != before {
            self.report().await;
        }
    }

    /// Detaches the panel into a separate window, carrying its markup over
    ///
    /// The panel leaves the desk, so it is no longer among the open panels.
    pub async fn pop_out_panel(&mut self, panel: impl Into<PanelId>) -> Result<(), LoadError> {
        let panel = panel.into();
        self.load(&panel, Origin::User).await?;

        if let Some(markup) = self
            .panels
            .get(&panel)
            .and_then(|state| state.markup.as_deref())
        {
            self.view.pop_out(&panel, markup);
        }

        self.close_panel(panel).await;
        Ok(())
    }

    /// Writes content carried back from a popped out window into the panel. Local only.
    pub fn restore_content(&mut self, panel: &PanelId, content: &str) {
        self.view.render(panel, content);
        self.panels.entry(panel.clone()).or_default().markup = Some(content.to_owned());
    }

    /// Moves the panel after it was dragged. Positions are not reported.
    pub fn move_panel(&mut self, panel: &PanelId, to: Position) {
        if let Some(state) = self.panels.get_mut(panel) {
            state.position = to;
            self.view.place(panel, to);
        }
    }

    /// Logs in, restoring panels open in the previous session
    ///
    /// On failure the user is notified, the error is returned for the caller's information.
    /// Logging in over an existing session ends that session on the server.
    pub async fn login(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), RequestError> {
        let credentials = Credentials::new(username, password);

        let response = match self.backend.login(&credentials).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, username = %credentials.username, "Login failed");
                self.view.notify(Notice::login_failed(&err));
                return Err(err);
            }
        };

        self.end_session().await;
        info!(user_id = response.user_id, "Logged in");
        self.session = Some(ClientSession {
            token: response.session_token,
            user_id: response.user_id,
            seq: 0,
        });

        self.restore(response.open_windows).await;
        Ok(())
    }

    /// Resumes a session kept across a page reload, restoring its panels
    ///
    /// Nothing is reported while restoring. A token the server doesn't accept anymore is dropped
    /// without bothering the user.
    pub async fn resume(&mut self, token: SessionToken) -> Result<(), RequestError> {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.token == token)
        {
            return Ok(());
        }

        let backend = &self.backend;
        let token_ref = &token;
        let resumed = async {
            let user = with_retry(move || backend.current_user(token_ref)).await?;
            let stored = with_retry(move || backend.stored_windows(token_ref)).await?;
            Ok::<_, RequestError>((user, stored))
        }
        .await;

        let (user, stored) = match resumed {
            Ok(resumed) => resumed,
            Err(err) => {
                debug!(error = %err, "Session not resumed");
                return Err(err);
            }
        };

        self.end_session().await;
        info!(user_id = user.user_id, seq = stored.seq, "Session resumed");
        self.session = Some(ClientSession {
            token,
            user_id: user.user_id,
            seq: stored.seq,
        });

        self.restore(stored.open_windows).await;
        Ok(())
    }

    /// Creates an account, closing the signup panel on success
    pub async fn signup(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<i64, RequestError> {
        let credentials = Credentials::new(username, password);

        match self.backend.signup(&credentials).await {
            Ok(response) => {
                info!(user_id = response.user_id, "Signed up");
                self.view.notify(Notice::SignedUp);
                self.close_panel(self.signup_panel.clone()).await;
                Ok(response.user_id)
            }
            Err(err) => {
                warn!(error = %err, username = %credentials.username, "Signup failed");
                self.view.notify(Notice::signup_failed(&err));
                Err(err)
            }
        }
    }

    /// Logs out after the user confirms it
    ///
    /// All the client state is dropped: the session, open panels and loaded markup. Returns
    /// `false` if the user changed their mind.
    pub async fn logout(&mut self) -> bool {
        if !self.view.confirm(LOGOUT_QUESTION) {
            return false;
        }

        self.end_session().await;

        for panel in self.open.drain(..) {
            self.view.set_visible(&panel, false);
        }
        self.panels.clear();
        self.view.show_landing();
        true
    }

    /// Ends the current session on the server, if any. Failures are only logged.
    async fn end_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(err) = self.backend.logout(&session.token).await {
            warn!(error = %err, "Server logout failed, dropping the session anyway");
        }
        info!(user_id = session.user_id, "Logged out");
    }

    /// Reopens panels in the stored order
    ///
    /// Nothing is reported while restoring - the server already knows these panels. Panels
    /// which fail to load are skipped silently.
    async fn restore(&mut self, panels: Vec<PanelId>) {
        for panel in panels {
            let anchor = self.view.anchor(&panel);
            if let Err(err) = self.show(panel, anchor, Origin::Restore).await {
                debug!(error = %err, "Panel not restored");
            }
        }
    }

    async fn show(
        &mut self,
        panel: PanelId,
        anchor: Option<Rect>,
        origin: Origin,
    ) -> Result<(), LoadError> {
        self.load(&panel, origin).await?;

        self.open.retain(|open| *open != panel);
        let position = match anchor {
            Some(anchor) => anchor.adjacent(),
            None => panel::cascade(self.open.len()),
        };

        self.panels.entry(panel.clone()).or_default().position = position;
        self.view.place(&panel, position);
        self.view.set_visible(&panel, true);
        self.open.push(panel);

        if origin == Origin::User {
            self.report().await;
        }
        Ok(())
    }

    /// Fetches and renders the panel markup, unless already done
    async fn load(&mut self, panel: &PanelId, origin: Origin) -> Result<(), LoadError> {
        if self.is_loaded(panel) {
            return Ok(());
        }

        let backend = &self.backend;
        match with_retry(move || backend.fetch_fragment(panel)).await {
            Ok(markup) => {
                self.view.render(panel, &markup);
                self.panels.entry(panel.clone()).or_default().markup = Some(markup);
                Ok(())
            }
            Err(source) => {
                warn!(%panel, error = %source, "Cannot load panel");
                if origin == Origin::User {
                    self.view.notify(Notice::PanelUnavailable(panel.clone()));
                }
                Err(LoadError {
                    panel: panel.clone(),
                    source,
                })
            }
        }
    }

    /// Reports open panels to the server, if logged in
    ///
    /// Failures never propagate - the user gets a notice, and the next change sends the full
    /// snapshot again anyway.
    async fn report(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.seq += 1;
        let report = WindowsReport {
            open_windows: self.open.clone(),
            seq: session.seq,
        };
        let token = session.token.clone();

        let backend = &self.backend;
        let (token_ref, report_ref) = (&token, &report);
        let result = with_retry(move || backend.report_windows(token_ref, report_ref)).await;

        match result {
            Ok(ack) if !ack.applied => {
                debug!(seq = report.seq, last_applied = ack.seq, "Newer report already applied");
            }
            Ok(_) => (),
            Err(err) if err.kind() == Some(ErrorKind::Unauthorized) => {
                warn!("Session rejected by the server, logging out locally");
                self.session = None;
                self.view.notify(Notice::SessionExpired);
            }
            Err(err) => {
                warn!(error = %err, seq = report.seq, "Cannot report open windows");
                self.view.notify(Notice::SyncFailed);
            }
        }
    }
}
