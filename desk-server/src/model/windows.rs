//! Open windows tracking
//!
//! Every user has an ordered sequence of panels that were open when the client last reported
//! its state. The sequence is stored on the user record, so it survives both logging out and
//! server restarts. Reports always replace the whole sequence.
//!
//! Reports are made through a session, and every session keeps the sequence number of the last
//! applied report. A report carrying a sequence number not greater than the last applied one is
//! stale and gets discarded, so reports overtaking each other can never roll the state back.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::Utc;
use color_eyre::Result;
use color_eyre::eyre::bail;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use thiserror::Error;

use crate::model::session::{self, SessionId};
use crate::model::users::UserId;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("Invalid panel id {0:?}")]
    InvalidPanelId(String),
    #[error("Unknown panel {0}")]
    UnknownPanel(PanelId),
    #[error("Too many open panels")]
    TooManyPanels,
    #[error("Report sequence number must be positive")]
    InvalidSequence,
}

const MAX_PANEL_ID_LEN: usize = 64;
const MAX_OPEN_PANELS: usize = 64;

/// Client-renderable panel identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PanelId(String);

impl std::fmt::Display for PanelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PanelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= MAX_PANEL_ID_LEN
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid {
            return Err(Error::InvalidPanelId(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for PanelId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PanelId> for String {
    fn from(value: PanelId) -> Self {
        value.0
    }
}

impl PanelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ordered sequence of open panels, the last one being on top
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenWindows(Vec<PanelId>);

impl OpenWindows {
    /// Builds the sequence from a client report
    ///
    /// Duplicates are collapsed keeping the first occurrence.
    pub fn from_reported(panels: impl IntoIterator<Item = PanelId>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        let panels: Vec<_> = panels
            .into_iter()
            .filter(|panel| seen.insert(panel.clone()))
            .collect();

        if panels.len() > MAX_OPEN_PANELS {
            return Err(Error::TooManyPanels);
        }

        Ok(Self(panels))
    }

    /// Ensures all panels are on the known panels list. Empty list means any panel is allowed.
    pub fn ensure_known(&self, known: &[PanelId]) -> Result<(), Error> {
        if known.is_empty() {
            return Ok(());
        }

        match self.0.iter().find(|panel| !known.contains(panel)) {
            Some(unknown) => Err(Error::UnknownPanel(unknown.clone())),
            None => Ok(()),
        }
    }

    pub fn panels(&self) -> &[PanelId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fetches open windows of an user
    ///
    /// Returns an empty sequence for users who never reported anything (or don't exist).
    pub async fn fetch(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
    ) -> Result<Self> {
        let row: Option<(Json<OpenWindows>,)> =
            sqlx::query_as("select open_windows from users where id = ?")
                .bind(user_id)
                .fetch_optional(db)
                .await?;

        Ok(row.map(|(Json(windows),)| windows).unwrap_or_default())
    }

    /// Fetches open windows through a session, along with the session's last applied report
    ///
    /// Fails with `Unauthorized` if the session is destroyed or expired.
    pub async fn fetch_for_session(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        session_id: &SessionId,
    ) -> Result<SessionWindows> {
        let row: Option<(Json<OpenWindows>, i64)> = sqlx::query_as(
            "select u.open_windows, s.last_report_seq from sessions s
                join users u on u.id = s.user_id
                where s.id = ? and s.expires_at > ?",
        )
        .bind(session_id)
        .bind(Utc::now())
        .fetch_optional(db)
        .await?;

        match row {
            Some((Json(open_windows), last_report_seq)) => Ok(SessionWindows {
                open_windows,
                last_report_seq,
            }),
            None => bail!(session::Error::Unauthorized),
        }
    }

    /// Applies a client report made through the session
    ///
    /// Without a sequence number the report is applied unconditionally and gets the next
    /// sequence number assigned. Session liveness is checked as a part of the write, so a report
    /// racing with a logout never resurrects the session.
    pub async fn report(
        self,
        db: &sqlx::SqlitePool,
        session_id: &SessionId,
        seq: Option<i64>,
    ) -> Result<Report> {
        if seq.is_some_and(|seq| seq <= 0) {
            bail!(Error::InvalidSequence);
        }

        let mut tx = db.begin().await?;
        let now = Utc::now();

        // Taking the write lock first, the sequence number comparison and the windows update
        // happen atomically.
        let applied: Option<(UserId, i64)> = sqlx::query_as(
            "update sessions set last_report_seq = coalesce(?1, last_report_seq + 1)
                where id = ?2 and expires_at > ?3 and (?1 is null or last_report_seq < ?1)
                returning user_id, last_report_seq",
        )
        .bind(seq)
        .bind(session_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, seq)) = applied else {
            let last: Option<(i64,)> = sqlx::query_as(
                "select last_report_seq from sessions where id = ? and expires_at > ?",
            )
            .bind(session_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return match last {
                Some((last_applied,)) => Ok(Report::Stale { last_applied }),
                None => bail!(session::Error::Unauthorized),
            };
        };

        sqlx::query("update users set open_windows = ? where id = ?")
            .bind(Json(&self))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Report::Applied { seq })
    }
}

/// Open windows seen through a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionWindows {
    pub open_windows: OpenWindows,
    /// Sequence number of the last report applied through the session, `0` if none
    pub last_report_seq: i64,
}

/// Outcome of an open windows report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Report was stored with the given sequence number
    Applied { seq: i64 },
    /// Newer report was already applied, this one is discarded
    Stale { last_applied: i64 },
}
