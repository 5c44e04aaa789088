//! Desk client
//!
//! Window controller of the desk page: opens, positions and closes panels, and keeps the
//! server informed about which panels are open, so they can be restored on the next login.
//!
//! The controller is written against two seams - [`Backend`] talking to the desk service, and
//! [`View`] rendering the panels. [`HttpBackend`] is the production backend.

pub mod backend;
pub mod controller;
pub mod http;
pub mod notice;
pub mod panel;

pub use backend::{
    Backend, Credentials, CurrentUser, ErrorKind, LoginResponse, RequestError, SessionToken,
    StoredWindows,
};
pub use controller::{LoadError, View, WindowController};
pub use http::HttpBackend;
pub use notice::Notice;
pub use panel::{PanelId, Position, Rect};
