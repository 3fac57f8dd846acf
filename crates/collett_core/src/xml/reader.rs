//! Project file reader.

use super::{
    XmlError, XmlResult, ATTR_CLASS, ATTR_FILE_VERSION, ATTR_HANDLE, ATTR_TYPE, ATTR_WORDS,
    EL_CREATED, EL_DATE, EL_ITEM, EL_META, EL_NAME, EL_PROJECT, EL_STRUCTURE, EL_TREE,
    FILE_VERSION, TREE_CLASS_STORY,
};
use crate::model::project_meta::ProjectMeta;
use crate::model::story_item::{StoryId, StoryItem, StoryKind, UNNAMED_ITEM, UNNAMED_PROJECT};
use crate::model::story_model::StoryModel;
use crate::storage::{project_file_path, Storage};
use log::{error, info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Model and metadata rebuilt from a project file.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub model: StoryModel,
    pub meta: ProjectMeta,
}

/// Rebuilds a project from its folder.
pub struct ProjectXmlReader<'s> {
    storage: &'s Storage,
}

impl<'s> ProjectXmlReader<'s> {
    pub fn new(storage: &'s Storage) -> Self {
        Self { storage }
    }

    /// Reads and parses the project file.
    ///
    /// # Errors
    /// - `Storage` when the file is missing, unreadable, or reading fails.
    /// - `ParseFailed` when the document is not well-formed.
    /// - `UnexpectedContent` when the document does not match the schema.
    pub fn read(&self) -> XmlResult<LoadedProject> {
        let started_at = Instant::now();
        let relative = project_file_path();
        let bytes = self.storage.read_file(&relative)?;
        let path = self.storage.root().join(&relative);

        match Self::from_bytes(&bytes, &path) {
            Ok(loaded) => {
                info!(
                    "event=xml_read module=xml status=ok items={} duration_ms={}",
                    loaded.model.item_count(),
                    started_at.elapsed().as_millis()
                );
                Ok(loaded)
            }
            Err(err) => {
                error!(
                    "event=xml_read module=xml status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Parses a project document held in memory.
    ///
    /// `path` is only used for error reporting.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> XmlResult<LoadedProject> {
        let text = std::str::from_utf8(bytes).map_err(|err| XmlError::ParseFailed {
            path: path.to_path_buf(),
            message: format!("document is not valid UTF-8: {err}"),
        })?;
        DocumentParser::new(text, path).parse()
    }
}

/// Item collected from the document before the model is assembled.
struct PendingItem {
    id: StoryId,
    kind: StoryKind,
    name: Option<String>,
    word_count: u32,
    children: Vec<PendingItem>,
}

impl PendingItem {
    fn to_item(&self, fallback_name: &str) -> StoryItem {
        let mut item = StoryItem::with_id(self.id, self.kind, "");
        item.rename_or(self.name.as_deref().unwrap_or(""), fallback_name);
        item.set_word_count(self.word_count);
        item
    }
}

struct DocumentParser<'a> {
    reader: Reader<&'a [u8]>,
    path: PathBuf,
    handles: HashSet<StoryId>,
}

impl<'a> DocumentParser<'a> {
    fn new(text: &'a str, path: &Path) -> Self {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            path: path.to_path_buf(),
            handles: HashSet::new(),
        }
    }

    fn parse(mut self) -> XmlResult<LoadedProject> {
        loop {
            match self.next_event()? {
                Event::Start(start) => {
                    self.expect_project_root(&start)?;
                    return self.parse_project_body();
                }
                Event::Empty(start) => {
                    self.expect_project_root(&start)?;
                    return Err(self.unexpected("project document has no story structure"));
                }
                Event::End(_) => return Err(self.parse_failed("closing tag without opening tag")),
                Event::Text(_) | Event::CData(_) => {
                    return Err(self.parse_failed("text outside the root element"));
                }
                Event::Eof => return Err(self.parse_failed("document has no root element")),
                _ => {}
            }
        }
    }

    fn expect_project_root(&self, start: &BytesStart<'_>) -> XmlResult<()> {
        if start.name().as_ref() != EL_PROJECT.as_bytes() {
            return Err(self.unexpected(format!(
                "root element is <{}>, expected <{EL_PROJECT}>",
                element_name(start)
            )));
        }
        match self.attribute(start, ATTR_FILE_VERSION)? {
            Some(version) if version == FILE_VERSION => Ok(()),
            Some(version) => Err(self.unexpected(format!(
                "unsupported file version `{version}`, expected `{FILE_VERSION}`"
            ))),
            None => {
                warn!(
                    "event=xml_read module=xml status=warn path={} detail=missing_file_version",
                    self.path.display()
                );
                Ok(())
            }
        }
    }

    fn parse_project_body(mut self) -> XmlResult<LoadedProject> {
        let mut meta: Option<ProjectMeta> = None;
        let mut model: Option<StoryModel> = None;

        loop {
            match self.next_event()? {
                Event::Start(start) => match start.name().as_ref() {
                    name if name == EL_META.as_bytes() => {
                        meta = Some(self.parse_meta()?);
                    }
                    name if name == EL_STRUCTURE.as_bytes() => {
                        if model.is_some() {
                            return Err(self.unexpected("more than one structure section"));
                        }
                        model = Some(self.parse_structure()?);
                    }
                    _ => self.skip_section(&start)?,
                },
                Event::Empty(start) => {
                    if start.name().as_ref() == EL_STRUCTURE.as_bytes() {
                        return Err(self.unexpected("structure section holds no story tree"));
                    }
                }
                Event::End(_) => break,
                Event::Text(_) | Event::CData(_) => self.ignored_text(),
                Event::Eof => return Err(self.parse_failed("unexpected end of document")),
                _ => {}
            }
        }

        let model = model.ok_or_else(|| self.unexpected("missing structure section"))?;
        let meta = meta.unwrap_or_else(|| {
            warn!(
                "event=xml_read module=xml status=warn path={} detail=missing_meta_section",
                self.path.display()
            );
            ProjectMeta::new()
        });
        Ok(LoadedProject { model, meta })
    }

    fn parse_meta(&mut self) -> XmlResult<ProjectMeta> {
        let mut meta = ProjectMeta::new();
        loop {
            match self.next_event()? {
                Event::Start(start) => match start.name().as_ref() {
                    name if name == EL_CREATED.as_bytes() => {
                        meta.created_at = self.timestamp(EL_CREATED)?;
                    }
                    name if name == EL_DATE.as_bytes() => {
                        meta.updated_at = self.timestamp(EL_DATE)?;
                    }
                    _ => self.skip_section(&start)?,
                },
                Event::End(_) => return Ok(meta),
                Event::Text(_) | Event::CData(_) => self.ignored_text(),
                Event::Eof => return Err(self.parse_failed("unexpected end of document")),
                _ => {}
            }
        }
    }

    fn timestamp(&mut self, element: &str) -> XmlResult<i64> {
        let text = self.element_text()?;
        text.trim().parse::<i64>().map_err(|_| {
            self.unexpected(format!("<{element}> holds `{text}`, expected epoch milliseconds"))
        })
    }

    fn parse_structure(&mut self) -> XmlResult<StoryModel> {
        let mut model: Option<StoryModel> = None;
        loop {
            match self.next_event()? {
                Event::Start(start) if start.name().as_ref() == EL_TREE.as_bytes() => {
                    let class = self.attribute(&start, ATTR_CLASS)?;
                    if class.as_deref().is_some_and(|value| value != TREE_CLASS_STORY) {
                        self.skip_section(&start)?;
                        continue;
                    }
                    if model.is_some() {
                        return Err(self.unexpected("more than one story tree"));
                    }
                    model = Some(self.parse_tree()?);
                }
                Event::Start(start) => self.skip_section(&start)?,
                Event::Empty(start) if start.name().as_ref() == EL_TREE.as_bytes() => {
                    return Err(self.unexpected("story tree holds no items"));
                }
                Event::End(_) => {
                    return model.ok_or_else(|| self.unexpected("structure section holds no story tree"));
                }
                Event::Text(_) | Event::CData(_) => self.ignored_text(),
                Event::Eof => return Err(self.parse_failed("unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_tree(&mut self) -> XmlResult<StoryModel> {
        let mut top_level = Vec::new();
        loop {
            match self.next_event()? {
                Event::Start(start) => top_level.push(self.parse_item(&start, false, None)?),
                Event::Empty(start) => top_level.push(self.parse_item(&start, true, None)?),
                Event::End(_) => break,
                Event::Text(_) | Event::CData(_) => self.ignored_text(),
                Event::Eof => return Err(self.parse_failed("unexpected end of document")),
                _ => {}
            }
        }

        if top_level.len() != 1 {
            return Err(self.unexpected(format!(
                "story tree must hold exactly one book, found {} top-level items",
                top_level.len()
            )));
        }
        let root = top_level.remove(0);
        self.assemble(root)
    }

    /// Reads one item and its children.
    ///
    /// Nesting is checked against `parent` before any child is read, so
    /// recursion never goes deeper than the longest legal kind chain.
    fn parse_item(
        &mut self,
        start: &BytesStart<'_>,
        self_closing: bool,
        parent: Option<StoryKind>,
    ) -> XmlResult<PendingItem> {
        if start.name().as_ref() != EL_ITEM.as_bytes() {
            return Err(self.unexpected(format!(
                "unexpected element <{}> in story tree",
                element_name(start)
            )));
        }
        let mut item = self.item_attributes(start)?;
        match parent {
            Some(parent) if !parent.can_contain(item.kind) => {
                return Err(self.nesting_error(&item, parent.as_str()));
            }
            None if item.kind != StoryKind::Book => {
                return Err(self.unexpected(format!(
                    "top-level story item {} is a {}, expected a book",
                    item.id, item.kind
                )));
            }
            _ => {}
        }
        if self_closing {
            return Ok(item);
        }

        loop {
            match self.next_event()? {
                Event::Start(child) if child.name().as_ref() == EL_NAME.as_bytes() => {
                    item.name = Some(self.element_text()?);
                }
                Event::Empty(child) if child.name().as_ref() == EL_NAME.as_bytes() => {
                    item.name = Some(String::new());
                }
                Event::Start(child) => {
                    item.children
                        .push(self.parse_item(&child, false, Some(item.kind))?);
                }
                Event::Empty(child) => {
                    item.children
                        .push(self.parse_item(&child, true, Some(item.kind))?);
                }
                Event::End(_) => return Ok(item),
                Event::Text(_) | Event::CData(_) => self.ignored_text(),
                Event::Eof => return Err(self.parse_failed("unexpected end of document")),
                _ => {}
            }
        }
    }

    fn item_attributes(&mut self, start: &BytesStart<'_>) -> XmlResult<PendingItem> {
        let kind_text = self
            .attribute(start, ATTR_TYPE)?
            .ok_or_else(|| self.unexpected(format!("story item without {ATTR_TYPE}")))?;
        let kind = StoryKind::parse(&kind_text)
            .ok_or_else(|| self.unexpected(format!("unknown story item type `{kind_text}`")))?;

        let handle_text = self
            .attribute(start, ATTR_HANDLE)?
            .ok_or_else(|| self.unexpected(format!("{kind} item without {ATTR_HANDLE}")))?;
        let id = Uuid::parse_str(handle_text.trim())
            .ok()
            .filter(|id| !id.is_nil())
            .ok_or_else(|| self.unexpected(format!("invalid item handle `{handle_text}`")))?;
        if !self.handles.insert(id) {
            return Err(self.unexpected(format!("duplicate item handle {id}")));
        }

        let word_count = match self.attribute(start, ATTR_WORDS)? {
            Some(value) => value.trim().parse::<u32>().map_err(|_| {
                self.unexpected(format!("invalid word count `{value}` on item {id}"))
            })?,
            None => 0,
        };

        Ok(PendingItem {
            id,
            kind,
            name: None,
            word_count,
            children: Vec::new(),
        })
    }

    fn assemble(&self, root: PendingItem) -> XmlResult<StoryModel> {
        let mut model = StoryModel::from_root(root.to_item(UNNAMED_PROJECT))
            .map_err(|err| self.unexpected(err.to_string()))?;

        let mut stack: Vec<(StoryId, PendingItem)> = root
            .children
            .into_iter()
            .rev()
            .map(|child| (root.id, child))
            .collect();
        while let Some((parent, mut pending)) = stack.pop() {
            let parent_kind = model.get(parent).map(StoryItem::kind);
            model.attach(parent, pending.to_item(UNNAMED_ITEM)).map_err(|_| {
                self.nesting_error(
                    &pending,
                    parent_kind.map_or("an unknown item", StoryKind::as_str),
                )
            })?;
            let children = std::mem::take(&mut pending.children);
            stack.extend(children.into_iter().rev().map(|child| (pending.id, child)));
        }
        Ok(model)
    }

    /// Collects the text of the element whose start tag was just read.
    fn element_text(&mut self) -> XmlResult<String> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(chunk) => {
                    let chunk = chunk
                        .unescape()
                        .map_err(|err| self.parse_failed(format!("bad text content: {err}")))?;
                    text.push_str(&chunk);
                }
                Event::CData(chunk) => {
                    text.push_str(&String::from_utf8_lossy(&chunk.into_inner()));
                }
                Event::Start(child) | Event::Empty(child) => {
                    return Err(self.unexpected(format!(
                        "unexpected element <{}> inside text",
                        element_name(&child)
                    )));
                }
                Event::End(_) => return Ok(text),
                Event::Eof => return Err(self.parse_failed("unexpected end of document")),
                _ => {}
            }
        }
    }

    fn attribute(&self, start: &BytesStart<'_>, key: &str) -> XmlResult<Option<String>> {
        for attribute in start.attributes() {
            let attribute = attribute
                .map_err(|err| self.parse_failed(format!("bad attribute: {err}")))?;
            if attribute.key.as_ref() == key.as_bytes() {
                let value = attribute
                    .unescape_value()
                    .map_err(|err| self.parse_failed(format!("bad attribute value: {err}")))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }

    fn skip_section(&mut self, start: &BytesStart<'_>) -> XmlResult<()> {
        warn!(
            "event=xml_read module=xml status=warn path={} detail=skipped_element element={}",
            self.path.display(),
            element_name(start)
        );
        let end = start.to_end().into_owned();
        self.reader
            .read_to_end(end.name())
            .map_err(|err| self.parse_failed(err.to_string()))?;
        Ok(())
    }

    fn ignored_text(&self) {
        warn!(
            "event=xml_read module=xml status=warn path={} detail=ignored_text position={}",
            self.path.display(),
            self.reader.buffer_position()
        );
    }

    fn next_event(&mut self) -> XmlResult<Event<'a>> {
        match self.reader.read_event() {
            Ok(event) => Ok(event),
            Err(err) => Err(self.parse_failed(format!(
                "{err} at byte {}",
                self.reader.buffer_position()
            ))),
        }
    }

    fn nesting_error(&self, item: &PendingItem, parent: &str) -> XmlError {
        self.unexpected(format!(
            "{} item {} is not allowed inside {parent}",
            item.kind, item.id
        ))
    }

    fn parse_failed(&self, message: impl Into<String>) -> XmlError {
        XmlError::ParseFailed {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    fn unexpected(&self, message: impl Into<String>) -> XmlError {
        XmlError::UnexpectedContent {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}
