//! Story item domain model.
//!
//! # Responsibility
//! - Define the structural unit kinds of an outline and their nesting rules.
//! - Define the single outline node record and its naming rules.
//!
//! # Invariants
//! - `id` is stable and never reused for another item in the same model.
//! - `kind` never changes after construction.
//! - `name` is always normalized and never empty.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Label substituted for blank item names.
pub const UNNAMED_ITEM: &str = "Unnamed";
/// Label substituted for a blank project root name.
pub const UNNAMED_PROJECT: &str = "Unnamed Project";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Stable identifier of one outline node.
///
/// Persisted as the item handle in project files.
pub type StoryId = Uuid;

/// Structural category of an outline node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryKind {
    /// Top-level container; the outline root is always a book.
    Book,
    /// Optional grouping of chapters inside a book.
    Partition,
    /// Narrative chapter holding scenes and pages.
    Chapter,
    /// Leaf unit of prose.
    Scene,
    /// Leaf unit for front/back matter.
    Page,
}

impl StoryKind {
    /// All kinds in their canonical order.
    pub const ALL: [StoryKind; 5] = [
        StoryKind::Book,
        StoryKind::Partition,
        StoryKind::Chapter,
        StoryKind::Scene,
        StoryKind::Page,
    ];

    /// Child kinds an item of this kind may hold.
    ///
    /// This table is the only authority on nesting; every mutation and the
    /// project file reader consult it.
    pub fn allowed_children(self) -> &'static [StoryKind] {
        match self {
            StoryKind::Book => &[StoryKind::Partition, StoryKind::Chapter],
            StoryKind::Partition => &[StoryKind::Chapter],
            StoryKind::Chapter => &[StoryKind::Scene, StoryKind::Page],
            StoryKind::Scene | StoryKind::Page => &[],
        }
    }

    /// Returns whether an item of this kind may hold a child of `child`.
    pub fn can_contain(self, child: StoryKind) -> bool {
        self.allowed_children().contains(&child)
    }

    /// Returns whether this kind can never hold children.
    pub fn is_leaf(self) -> bool {
        self.allowed_children().is_empty()
    }

    /// Lowercase tag used in project files.
    pub fn as_str(self) -> &'static str {
        match self {
            StoryKind::Book => "book",
            StoryKind::Partition => "partition",
            StoryKind::Chapter => "chapter",
            StoryKind::Scene => "scene",
            StoryKind::Page => "page",
        }
    }

    /// Parses a project file tag, ignoring ASCII case.
    pub fn parse(value: &str) -> Option<StoryKind> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// User-facing label of the kind.
    pub fn label(self) -> &'static str {
        match self {
            StoryKind::Book => "Book",
            StoryKind::Partition => "Partition",
            StoryKind::Chapter => "Chapter",
            StoryKind::Scene => "Scene",
            StoryKind::Page => "Page",
        }
    }

    /// Name given to a freshly added item of this kind, e.g. `New Scene`.
    pub fn default_name(self) -> String {
        format!("New {}", self.label())
    }
}

impl Display for StoryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the outline tree.
///
/// Items carry no structure of their own; parent and child relations live in
/// `StoryModel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryItem {
    id: StoryId,
    kind: StoryKind,
    name: String,
    /// Words in the item's own content, excluding children.
    word_count: u32,
}

impl StoryItem {
    /// Creates an item with a generated id.
    pub fn new(kind: StoryKind, name: &str) -> Self {
        Self::with_id(Uuid::new_v4(), kind, name)
    }

    /// Creates an item with a caller-provided id.
    ///
    /// Used by the project file reader, where identity already exists.
    pub fn with_id(id: StoryId, kind: StoryKind, name: &str) -> Self {
        Self {
            id,
            kind,
            name: normalize_name(name, UNNAMED_ITEM),
            word_count: 0,
        }
    }

    pub fn id(&self) -> StoryId {
        self.id
    }

    pub fn kind(&self) -> StoryKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn word_count(&self) -> u32 {
        self.word_count
    }

    /// Replaces the display name; blank input becomes `Unnamed`.
    pub fn rename(&mut self, name: &str) {
        self.rename_or(name, UNNAMED_ITEM);
    }

    /// Replaces the display name; blank input becomes `fallback`.
    pub fn rename_or(&mut self, name: &str, fallback: &str) {
        self.name = normalize_name(name, fallback);
    }

    pub fn set_word_count(&mut self, count: u32) {
        self.word_count = count;
    }
}

/// Trims a name and collapses inner whitespace runs to single spaces.
///
/// Returns `fallback` when nothing is left.
pub fn normalize_name(value: &str, fallback: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    if collapsed.is_empty() {
        fallback.to_string()
    } else {
        collapsed.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_name, StoryItem, StoryKind, UNNAMED_ITEM};

    #[test]
    fn nesting_table_matches_outline_rules() {
        assert!(StoryKind::Book.can_contain(StoryKind::Partition));
        assert!(StoryKind::Book.can_contain(StoryKind::Chapter));
        assert!(!StoryKind::Book.can_contain(StoryKind::Scene));
        assert!(StoryKind::Partition.can_contain(StoryKind::Chapter));
        assert!(!StoryKind::Partition.can_contain(StoryKind::Partition));
        assert!(StoryKind::Chapter.can_contain(StoryKind::Scene));
        assert!(StoryKind::Chapter.can_contain(StoryKind::Page));
        for kind in StoryKind::ALL {
            assert!(!StoryKind::Scene.can_contain(kind));
            assert!(!StoryKind::Page.can_contain(kind));
            assert!(!kind.can_contain(StoryKind::Book));
        }
    }

    #[test]
    fn parse_accepts_any_case_and_rejects_unknown_tags() {
        assert_eq!(StoryKind::parse("CHAPTER"), Some(StoryKind::Chapter));
        assert_eq!(StoryKind::parse(" scene "), Some(StoryKind::Scene));
        assert_eq!(StoryKind::parse("root"), None);
        assert_eq!(StoryKind::parse(""), None);
    }

    #[test]
    fn default_name_uses_kind_label() {
        assert_eq!(StoryKind::Scene.default_name(), "New Scene");
        assert_eq!(StoryKind::Partition.default_name(), "New Partition");
    }

    #[test]
    fn rename_normalizes_and_substitutes_blank_names() {
        let mut item = StoryItem::new(StoryKind::Chapter, "  Chapter\t\n One ");
        assert_eq!(item.name(), "Chapter One");

        item.rename("   ");
        assert_eq!(item.name(), UNNAMED_ITEM);
        assert_eq!(item.kind(), StoryKind::Chapter);
    }

    #[test]
    fn normalize_name_returns_fallback_for_empty_input() {
        assert_eq!(normalize_name("", "Fallback"), "Fallback");
        assert_eq!(normalize_name("a  b", "Fallback"), "a b");
    }
}
