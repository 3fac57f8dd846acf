//! Project file writer.

use super::{
    XmlError, XmlResult, ATTR_APP_VERSION, ATTR_CLASS, ATTR_FILE_VERSION, ATTR_HANDLE,
    ATTR_ORDER, ATTR_TYPE, ATTR_WORDS, EL_CONTENT, EL_CREATED, EL_DATE, EL_EXTRA, EL_ITEM,
    EL_META, EL_NAME, EL_PROJECT, EL_SETTINGS, EL_STRUCTURE, EL_STYLES, EL_TREE, FILE_VERSION,
    NS_COLLETT, NS_DC, NS_ITEM, NS_META, TREE_CLASS_STORY,
};
use crate::model::project_meta::ProjectMeta;
use crate::model::story_item::StoryId;
use crate::model::story_model::StoryModel;
use crate::storage::{project_file_path, Storage, PROJECT_FOLDER};
use log::{error, info};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use std::time::Instant;

const INDENT_WIDTH: usize = 2;

/// Serializes a project into its folder.
pub struct ProjectXmlWriter<'s> {
    storage: &'s Storage,
}

impl<'s> ProjectXmlWriter<'s> {
    pub fn new(storage: &'s Storage) -> Self {
        Self { storage }
    }

    /// Writes `model` and `meta` to the project file.
    ///
    /// # Errors
    /// - `InconsistentModel` when `model` fails validation; nothing is
    ///   written in that case.
    /// - `Storage` for folder creation or file replacement failures.
    pub fn write(&self, model: &StoryModel, meta: &ProjectMeta) -> XmlResult<()> {
        let started_at = Instant::now();
        let bytes = match Self::to_bytes(model, meta) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(
                    "event=xml_write module=xml status=error error_code=inconsistent_model error={}",
                    err
                );
                return Err(err);
            }
        };

        self.storage.ensure_folder(PROJECT_FOLDER)?;
        self.storage.write_file(project_file_path(), &bytes)?;

        info!(
            "event=xml_write module=xml status=ok items={} bytes={} duration_ms={}",
            model.item_count(),
            bytes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Renders the project document without touching storage.
    pub fn to_bytes(model: &StoryModel, meta: &ProjectMeta) -> XmlResult<Vec<u8>> {
        model.validate().map_err(XmlError::InconsistentModel)?;

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_WIDTH);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(encode_error)?;

        let mut project = BytesStart::new(EL_PROJECT);
        project.push_attribute(("xmlns:collett", NS_COLLETT));
        project.push_attribute(("xmlns:item", NS_ITEM));
        project.push_attribute(("xmlns:meta", NS_META));
        project.push_attribute(("xmlns:dc", NS_DC));
        project.push_attribute((ATTR_FILE_VERSION, FILE_VERSION));
        project.push_attribute((ATTR_APP_VERSION, env!("CARGO_PKG_VERSION")));
        writer
            .write_event(Event::Start(project))
            .map_err(encode_error)?;

        write_meta(&mut writer, meta)?;
        write_empty_section(&mut writer, EL_SETTINGS)?;
        write_empty_section(&mut writer, EL_STYLES)?;
        write_structure(&mut writer, model)?;
        write_empty_section(&mut writer, EL_CONTENT)?;
        write_empty_section(&mut writer, EL_EXTRA)?;

        writer
            .write_event(Event::End(BytesEnd::new(EL_PROJECT)))
            .map_err(encode_error)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn write_meta(writer: &mut Writer<Vec<u8>>, meta: &ProjectMeta) -> XmlResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(EL_META)))
        .map_err(encode_error)?;
    write_text_element(writer, EL_CREATED, &meta.created_at.to_string())?;
    write_text_element(writer, EL_DATE, &meta.updated_at.to_string())?;
    writer
        .write_event(Event::End(BytesEnd::new(EL_META)))
        .map_err(encode_error)?;
    Ok(())
}

fn write_structure(writer: &mut Writer<Vec<u8>>, model: &StoryModel) -> XmlResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(EL_STRUCTURE)))
        .map_err(encode_error)?;

    let mut tree = BytesStart::new(EL_TREE);
    tree.push_attribute((ATTR_CLASS, TREE_CLASS_STORY));
    writer.write_event(Event::Start(tree)).map_err(encode_error)?;
    write_item(writer, model, model.root_id(), 0)?;
    writer
        .write_event(Event::End(BytesEnd::new(EL_TREE)))
        .map_err(encode_error)?;

    writer
        .write_event(Event::End(BytesEnd::new(EL_STRUCTURE)))
        .map_err(encode_error)?;
    Ok(())
}

fn write_item(
    writer: &mut Writer<Vec<u8>>,
    model: &StoryModel,
    id: StoryId,
    order: usize,
) -> XmlResult<()> {
    let item = model
        .get(id)
        .ok_or_else(|| XmlError::InconsistentModel(format!("item {id} vanished")))?;

    let handle = id.to_string();
    let order = order.to_string();
    let words = item.word_count().to_string();
    let mut element = BytesStart::new(EL_ITEM);
    element.push_attribute((ATTR_TYPE, item.kind().as_str()));
    element.push_attribute((ATTR_HANDLE, handle.as_str()));
    element.push_attribute((ATTR_ORDER, order.as_str()));
    element.push_attribute((ATTR_WORDS, words.as_str()));
    writer
        .write_event(Event::Start(element))
        .map_err(encode_error)?;

    write_text_element(writer, EL_NAME, item.name())?;

    let children = model
        .children_of(id)
        .map_err(|err| XmlError::InconsistentModel(err.to_string()))?;
    for (row, child) in children.iter().enumerate() {
        write_item(writer, model, *child, row)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(EL_ITEM)))
        .map_err(encode_error)?;
    Ok(())
}

fn write_empty_section(writer: &mut Writer<Vec<u8>>, name: &str) -> XmlResult<()> {
    writer
        .write_event(Event::Empty(BytesStart::new(name)))
        .map_err(encode_error)?;
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> XmlResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(encode_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(encode_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(encode_error)?;
    Ok(())
}

fn encode_error(err: impl Display) -> XmlError {
    XmlError::InconsistentModel(format!("could not encode project document: {err}"))
}
