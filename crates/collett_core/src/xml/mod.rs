//! Project file serialization.
//!
//! # Responsibility
//! - Map a `StoryModel` and its `ProjectMeta` to the namespaced XML project
//!   document and back.
//! - Route all byte I/O through `Storage`.
//!
//! # Invariants
//! - Writing then reading a valid model yields an isomorphic model with the
//!   same handles.
//! - Structural problems in a well-formed document are reported as
//!   `UnexpectedContent`, never repaired.

use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod reader;
mod writer;

pub use reader::{LoadedProject, ProjectXmlReader};
pub use writer::ProjectXmlWriter;

/// Format version written to and accepted from project files.
pub const FILE_VERSION: &str = "1.0-draft";

pub(crate) const NS_COLLETT: &str = "urn:collett:project";
pub(crate) const NS_ITEM: &str = "urn:collett:item";
pub(crate) const NS_META: &str = "urn:collett:meta";
pub(crate) const NS_DC: &str = "http://purl.org/dc/elements/1.1/";

pub(crate) const EL_PROJECT: &str = "collett:project";
pub(crate) const EL_META: &str = "collett:meta";
pub(crate) const EL_SETTINGS: &str = "collett:settings";
pub(crate) const EL_STYLES: &str = "collett:styles";
pub(crate) const EL_STRUCTURE: &str = "collett:structure";
pub(crate) const EL_CONTENT: &str = "collett:content";
pub(crate) const EL_EXTRA: &str = "collett:extra";
pub(crate) const EL_TREE: &str = "collett:tree";
pub(crate) const EL_ITEM: &str = "collett:item";
pub(crate) const EL_NAME: &str = "item:name";
pub(crate) const EL_CREATED: &str = "dc:created";
pub(crate) const EL_DATE: &str = "dc:date";

pub(crate) const ATTR_FILE_VERSION: &str = "meta:file-version";
pub(crate) const ATTR_APP_VERSION: &str = "meta:app-version";
pub(crate) const ATTR_CLASS: &str = "item:class";
pub(crate) const ATTR_TYPE: &str = "item:type";
pub(crate) const ATTR_HANDLE: &str = "item:handle";
pub(crate) const ATTR_ORDER: &str = "item:order";
pub(crate) const ATTR_WORDS: &str = "item:words";

pub(crate) const TREE_CLASS_STORY: &str = "story";

/// Result type used by project file operations.
pub type XmlResult<T> = Result<T, XmlError>;

/// Errors from reading or writing the project file.
#[derive(Debug)]
pub enum XmlError {
    /// Storage-level failure, passed through unchanged.
    Storage(StorageError),
    /// Document is not well-formed XML.
    ParseFailed { path: PathBuf, message: String },
    /// Well-formed document does not match the project schema.
    UnexpectedContent { path: PathBuf, message: String },
    /// The in-memory model broke its own invariants. Indicates a defect.
    InconsistentModel(String),
}

impl Display for XmlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "{err}"),
            Self::ParseFailed { path, message } => {
                write!(f, "could not parse {}: {message}", path.display())
            }
            Self::UnexpectedContent { path, message } => {
                write!(f, "unexpected content in {}: {message}", path.display())
            }
            Self::InconsistentModel(message) => {
                write!(f, "refusing to write inconsistent project: {message}")
            }
        }
    }
}

impl Error for XmlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::ParseFailed { .. } => None,
            Self::UnexpectedContent { .. } => None,
            Self::InconsistentModel(_) => None,
        }
    }
}

impl From<StorageError> for XmlError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}
