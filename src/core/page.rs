//! Encyclopedia page snapshots. Immutable once fetched.

use serde::{Deserialize, Serialize};

/// Page identifier used by the path oracle and content API.
pub type PageId = u64;

/// Table-of-contents entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Nesting depth (1 = top level).
    pub toclevel: u32,
    /// Heading text.
    pub line: String,
    /// Fragment anchor.
    pub anchor: String,
}

/// A page as shown to players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiPage {
    /// Canonical title.
    pub name: String,
    /// Links to the goal page along a shortest path.
    pub distance: u32,
    /// Renderable HTML.
    pub content: String,
    /// Section list.
    pub sections: Vec<Section>,
}
