//! Open project facade.
//!
//! # Responsibility
//! - Bind one project folder to one outline model for the session.
//! - Coordinate load and save through the XML reader/writer.
//! - Store per-item content files and keep word counts in sync.
//!
//! # Invariants
//! - Exactly one `StoryModel` and one `Storage` per open project.
//! - A failed save leaves the in-memory project exactly as before.
//! - `close` consumes the project; nothing can run on it afterwards.

use crate::model::project_meta::ProjectMeta;
use crate::model::story_item::StoryId;
use crate::model::story_model::{ModelError, StoryModel};
use crate::storage::{project_file_path, Storage, StorageError, CONTENT_FOLDER, PROJECT_FOLDER};
use crate::xml::{LoadedProject, ProjectXmlReader, ProjectXmlWriter, XmlError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const CONTENT_SUFFIX: &str = ".txt";

/// Result type used by project operations.
pub type ProjectResult<T> = Result<T, ProjectError>;

/// Errors from project lifecycle operations.
#[derive(Debug)]
pub enum ProjectError {
    /// Path does not resolve to a usable project folder.
    ProjectNotFound { path: PathBuf, source: StorageError },
    /// Storage-level failure.
    Storage(StorageError),
    /// Project file could not be read or written.
    Xml(XmlError),
    /// Outline operation failed.
    Model(ModelError),
}

impl Display for ProjectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProjectNotFound { path, .. } => {
                write!(f, "project not found at: {}", path.display())
            }
            Self::Storage(err) => write!(f, "{err}"),
            Self::Xml(err) => write!(f, "{err}"),
            Self::Model(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProjectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ProjectNotFound { source, .. } => Some(source),
            Self::Storage(err) => Some(err),
            Self::Xml(err) => Some(err),
            Self::Model(err) => Some(err),
        }
    }
}

impl From<StorageError> for ProjectError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<XmlError> for ProjectError {
    fn from(value: XmlError) -> Self {
        Self::Xml(value)
    }
}

impl From<ModelError> for ProjectError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

/// An open writing project.
#[derive(Debug)]
pub struct Project {
    storage: Storage,
    model: StoryModel,
    meta: ProjectMeta,
}

impl Project {
    /// Opens the project stored in folder `path`.
    ///
    /// A folder without a project file opens as a new, empty project.
    ///
    /// # Errors
    /// - `ProjectNotFound` when `path` is not an existing folder or its
    ///   project subfolder cannot be created.
    /// - `Xml` when an existing project file cannot be read.
    pub fn open(path: impl AsRef<Path>) -> ProjectResult<Self> {
        let started_at = Instant::now();
        let path = path.as_ref();
        info!(
            "event=project_open module=project status=start path={}",
            path.display()
        );

        let result = Self::open_inner(path);
        match &result {
            Ok(project) => info!(
                "event=project_open module=project status=ok path={} items={} duration_ms={}",
                project.storage.root().display(),
                project.model.item_count(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=project_open module=project status=error path={} duration_ms={} error={}",
                path.display(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Creates `path` (and missing parents) and opens it as a project.
    ///
    /// # Errors
    /// - `Storage(FolderCreateFailed)` when the folder cannot be created.
    /// - Any error from `Project::open`.
    pub fn create(path: impl AsRef<Path>) -> ProjectResult<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|source| StorageError::FolderCreateFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::open(path)
    }

    fn open_inner(path: &Path) -> ProjectResult<Self> {
        let not_found = |source: StorageError| ProjectError::ProjectNotFound {
            path: path.to_path_buf(),
            source,
        };
        let storage = Storage::locate(path).map_err(not_found)?;
        storage.ensure_folder(PROJECT_FOLDER).map_err(not_found)?;

        let LoadedProject { model, meta } = if storage.exists(project_file_path())? {
            ProjectXmlReader::new(&storage).read()?
        } else {
            LoadedProject {
                model: StoryModel::default(),
                meta: ProjectMeta::new(),
            }
        };

        Ok(Self {
            storage,
            model,
            meta,
        })
    }

    /// Writes the outline and metadata to the project file.
    ///
    /// # Errors
    /// - `Xml` with the writer's error, unchanged. `updated_at` is restored.
    pub fn save(&mut self) -> ProjectResult<()> {
        let started_at = Instant::now();
        let previous = self.meta.touch();

        match ProjectXmlWriter::new(&self.storage).write(&self.model, &self.meta) {
            Ok(()) => {
                self.prune_content();
                info!(
                    "event=project_save module=project status=ok path={} duration_ms={}",
                    self.storage.root().display(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                self.meta.updated_at = previous;
                error!(
                    "event=project_save module=project status=error path={} duration_ms={} error={}",
                    self.storage.root().display(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Releases the model and storage of this project.
    pub fn close(self) {
        info!(
            "event=project_close module=project status=ok path={}",
            self.storage.root().display()
        );
    }

    pub fn model(&self) -> &StoryModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut StoryModel {
        &mut self.model
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn meta(&self) -> &ProjectMeta {
        &self.meta
    }

    /// Project name, i.e. the label of the root book.
    pub fn name(&self) -> &str {
        self.model.root().name()
    }

    /// Renames the root book; a blank name becomes `Unnamed Project`.
    pub fn set_name(&mut self, name: &str) {
        let root = self.model.root_id();
        let renamed = self.model.rename_item(root, name);
        debug_assert!(renamed.is_ok(), "root item is always present");
    }

    /// Removes `id` with its subtree and deletes their content files.
    ///
    /// Returns the removed ids in depth-first order. Content files that
    /// cannot be deleted now are pruned by the next `save`.
    ///
    /// # Errors
    /// - `Model(UnknownTarget)` or `Model(CannotRemoveRoot)`; nothing is
    ///   removed in that case.
    pub fn remove_item(&mut self, id: StoryId) -> ProjectResult<Vec<StoryId>> {
        let removed = self.model.remove_item(id)?;
        for removed_id in &removed {
            if let Err(err) = self.storage.remove_file(content_file_path(*removed_id)) {
                warn!(
                    "event=content_remove module=project status=warn item={} error={}",
                    removed_id, err
                );
            }
        }
        info!(
            "event=item_remove module=project status=ok item={} removed={}",
            id,
            removed.len()
        );
        Ok(removed)
    }

    /// Stores the content text of one item and refreshes its word count.
    ///
    /// # Errors
    /// - `Model(UnknownTarget)` when `id` is not in the outline.
    /// - `Storage` when the content folder or file cannot be written.
    pub fn write_content(&mut self, id: StoryId, text: &str) -> ProjectResult<()> {
        if !self.model.contains(id) {
            return Err(ModelError::UnknownTarget(id).into());
        }
        self.storage.ensure_folder(CONTENT_FOLDER)?;
        self.storage
            .write_file(content_file_path(id), text.as_bytes())?;

        let words = count_words(text);
        self.model.set_word_count(id, words)?;
        info!(
            "event=content_write module=project status=ok item={} words={}",
            id, words
        );
        Ok(())
    }

    /// Returns the stored content text of one item.
    ///
    /// Items without a content file yet read as empty text.
    ///
    /// # Errors
    /// - `Model(UnknownTarget)` when `id` is not in the outline.
    /// - `Storage` when the content file exists but cannot be read.
    pub fn read_content(&self, id: StoryId) -> ProjectResult<String> {
        if !self.model.contains(id) {
            return Err(ModelError::UnknownTarget(id).into());
        }
        let relative = content_file_path(id);
        if !self.storage.exists(&relative)? {
            return Ok(String::new());
        }
        let bytes = self.storage.read_file(&relative)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Deletes content files whose item is no longer in the outline.
    ///
    /// Failures are logged; the outline on disk is already consistent.
    fn prune_content(&self) {
        let names = match self.storage.list_files(CONTENT_FOLDER) {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    "event=content_prune module=project status=warn error={}",
                    err
                );
                return;
            }
        };

        let mut pruned = 0usize;
        for name in names {
            let Some(id) = content_id(&name) else {
                continue;
            };
            if self.model.contains(id) {
                continue;
            }
            match self.storage.remove_file(content_file_path(id)) {
                Ok(_) => pruned += 1,
                Err(err) => warn!(
                    "event=content_prune module=project status=warn item={} error={}",
                    id, err
                ),
            }
        }
        if pruned > 0 {
            info!(
                "event=content_prune module=project status=ok pruned={}",
                pruned
            );
        }
    }
}

/// Item id encoded in a content file name, if the name is one.
fn content_id(file_name: &str) -> Option<StoryId> {
    let stem = file_name.strip_suffix(CONTENT_SUFFIX)?;
    StoryId::parse_str(stem)
        .ok()
        .filter(|id| id.to_string() == stem)
}

fn content_file_path(id: StoryId) -> PathBuf {
    Path::new(CONTENT_FOLDER).join(format!("{id}{CONTENT_SUFFIX}"))
}

fn count_words(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
