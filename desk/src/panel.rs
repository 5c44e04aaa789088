//! Panels and their geometry

use serde::{Deserialize, Serialize};

/// Gap between the anchor and the panel opened next to it
const ANCHOR_GAP: i32 = 8;

/// Offset between panels opened without an anchor
const CASCADE_STEP: i32 = 32;

/// Client-renderable panel identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(String);

impl PanelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the panel markup fragment
    pub fn fragment_path(&self) -> String {
        format!("{}.html", self.0)
    }
}

impl std::fmt::Display for PanelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PanelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Top-left corner of a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Area occupied by an element on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    /// Position of a panel opened next to this element - to its right, top aligned
    pub fn adjacent(&self) -> Position {
        Position {
            x: self.x.saturating_add(self.w).saturating_add(ANCHOR_GAP),
            y: self.y,
        }
    }
}

/// Position of a panel opened without an anchor, cascading over `open` already open panels
pub fn cascade(open: usize) -> Position {
    let step = i32::try_from(open).unwrap_or(i32::MAX).saturating_mul(CASCADE_STEP);
    Position {
        x: CASCADE_STEP.saturating_add(step),
        y: CASCADE_STEP.saturating_add(step),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_placed_right_of_anchor() {
        let anchor = Rect {
            x: 10,
            y: 20,
            w: 100,
            h: 30,
        };
        assert_eq!(anchor.adjacent(), Position { x: 118, y: 20 });
    }

    #[test]
    fn unanchored_panels_cascade() {
        assert_eq!(cascade(0), Position { x: 32, y: 32 });
        assert_eq!(cascade(2), Position { x: 96, y: 96 });
    }

    #[test]
    fn fragment_path() {
        assert_eq!(PanelId::new("window-signup").fragment_path(), "window-signup.html");
    }
}
