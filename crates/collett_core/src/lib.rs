//! Core of the Collett novel writing tool.
//! Owns the story outline, its invariants, and project folder persistence.

pub mod logging;
pub mod model;
pub mod project;
pub mod storage;
pub mod xml;

pub use logging::{default_log_level, init_logging, logging_status, LOG_LEVEL_ENV};
pub use model::project_meta::ProjectMeta;
pub use model::story_item::{StoryId, StoryItem, StoryKind, UNNAMED_ITEM, UNNAMED_PROJECT};
pub use model::story_model::{
    ModelError, OutlineNode, OutlineShape, Position, StoryModel, Traverse,
};
pub use project::{Project, ProjectError, ProjectResult};
pub use storage::{Storage, StorageError, StorageResult, CONTENT_FOLDER, PROJECT_FILE, PROJECT_FOLDER};
pub use xml::{LoadedProject, ProjectXmlReader, ProjectXmlWriter, XmlError, XmlResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
