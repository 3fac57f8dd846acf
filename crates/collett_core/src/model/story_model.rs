//! Outline tree model.
//!
//! # Responsibility
//! - Own every `StoryItem` of one project in an id-indexed arena.
//! - Provide add, rename, remove and move operations with relative positions.
//! - Expose read-only depth-first traversal and nested snapshots.
//!
//! # Invariants
//! - The root is a book, has no parent and can never be removed.
//! - Every non-root item appears exactly once in its parent's child list.
//! - Parent/child kinds always satisfy `StoryKind::allowed_children`.
//! - Each operation validates fully before mutating; a failed call leaves
//!   the tree untouched.

use crate::model::story_item::{
    normalize_name, StoryId, StoryItem, StoryKind, UNNAMED_ITEM, UNNAMED_PROJECT,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Relative placement used when inserting or moving an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Last child of the target.
    Inside,
    /// Sibling directly before the target.
    Before,
    /// Sibling directly after the target.
    After,
    /// First child of the target.
    Here,
}

/// Errors from outline tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Referenced item does not exist in this model.
    UnknownTarget(StoryId),
    /// `target` cannot hold an item of `kind` at the requested position.
    InvalidNesting { target: StoryId, kind: StoryKind },
    /// Destination lies inside the subtree being moved.
    CyclicMove { id: StoryId, target: StoryId },
    /// The root item is permanent.
    CannotRemoveRoot(StoryId),
    /// An item with this id is already part of the model.
    DuplicateId(StoryId),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTarget(id) => write!(f, "story item not found: {id}"),
            Self::InvalidNesting { target, kind } => {
                write!(f, "story item {target} cannot hold a {kind} here")
            }
            Self::CyclicMove { id, target } => write!(
                f,
                "move would place story item {id} inside its own subtree at {target}"
            ),
            Self::CannotRemoveRoot(id) => write!(f, "cannot remove root story item: {id}"),
            Self::DuplicateId(id) => write!(f, "duplicate story item id: {id}"),
        }
    }
}

impl Error for ModelError {}

#[derive(Debug, Clone)]
struct Slot {
    item: StoryItem,
    parent: Option<StoryId>,
    children: Vec<StoryId>,
}

impl Slot {
    fn new(item: StoryItem, parent: Option<StoryId>) -> Self {
        Self {
            item,
            parent,
            children: Vec::new(),
        }
    }
}

/// Ordered outline tree of one project.
///
/// Not internally synchronized; callers needing shared access serialize
/// through their own lock or a single owning task.
#[derive(Debug, Clone)]
pub struct StoryModel {
    root: StoryId,
    slots: HashMap<StoryId, Slot>,
}

impl Default for StoryModel {
    fn default() -> Self {
        Self::new(UNNAMED_PROJECT)
    }
}

impl StoryModel {
    /// Creates a model holding only a root book.
    ///
    /// A blank `root_name` becomes `Unnamed Project`.
    pub fn new(root_name: &str) -> Self {
        let root = StoryItem::new(StoryKind::Book, &normalize_name(root_name, UNNAMED_PROJECT));
        Self::from_root_unchecked(root)
    }

    /// Creates a model around an existing root item.
    ///
    /// # Errors
    /// - `InvalidNesting` when `root` is not a book.
    pub fn from_root(root: StoryItem) -> Result<Self, ModelError> {
        if root.kind() != StoryKind::Book {
            return Err(ModelError::InvalidNesting {
                target: root.id(),
                kind: root.kind(),
            });
        }
        Ok(Self::from_root_unchecked(root))
    }

    fn from_root_unchecked(root: StoryItem) -> Self {
        let root_id = root.id();
        let mut slots = HashMap::new();
        slots.insert(root_id, Slot::new(root, None));
        Self {
            root: root_id,
            slots,
        }
    }

    pub fn root_id(&self) -> StoryId {
        self.root
    }

    pub fn root(&self) -> &StoryItem {
        // The root slot is inserted at construction and never removed.
        &self.slots[&self.root].item
    }

    /// Number of items, root included.
    pub fn item_count(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: StoryId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get(&self, id: StoryId) -> Option<&StoryItem> {
        self.slots.get(&id).map(|slot| &slot.item)
    }

    /// Parent of `id`; `None` for the root or unknown ids.
    pub fn parent_of(&self, id: StoryId) -> Option<StoryId> {
        self.slots.get(&id).and_then(|slot| slot.parent)
    }

    /// Ordered child ids of `id`.
    pub fn children_of(&self, id: StoryId) -> Result<&[StoryId], ModelError> {
        Ok(&self.slot(id)?.children)
    }

    /// Distance from the root; the root has depth 0.
    pub fn depth_of(&self, id: StoryId) -> Option<usize> {
        let mut slot = self.slots.get(&id)?;
        let mut depth = 0;
        while let Some(parent) = slot.parent {
            slot = self.slots.get(&parent)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Returns whether `id` lies strictly below `ancestor`.
    pub fn is_descendant(&self, id: StoryId, ancestor: StoryId) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = self.parent_of(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            cursor = self.parent_of(current);
        }
        false
    }

    /// Adds a new item relative to `target`.
    ///
    /// A missing or blank `name` becomes `New <Kind>`.
    ///
    /// # Errors
    /// - `UnknownTarget` when `target` does not exist.
    /// - `InvalidNesting` when the resulting parent cannot hold `kind`, or
    ///   when a sibling position is requested relative to the root.
    pub fn add_item(
        &mut self,
        kind: StoryKind,
        target: StoryId,
        position: Position,
        name: Option<&str>,
    ) -> Result<StoryId, ModelError> {
        let (parent, index) = self.placement(kind, target, position)?;
        let default_name = kind.default_name();
        let name = normalize_name(name.unwrap_or_default(), &default_name);
        let item = StoryItem::new(kind, &name);
        let id = item.id();
        self.insert_slot(item, parent, index);
        Ok(id)
    }

    /// Appends a prebuilt item as the last child of `parent`.
    ///
    /// Used when rebuilding a model from a project file, where ids and word
    /// counts already exist.
    ///
    /// # Errors
    /// - `UnknownTarget` when `parent` does not exist.
    /// - `DuplicateId` when the item's id is already in use.
    /// - `InvalidNesting` when `parent` cannot hold the item's kind.
    pub fn attach(&mut self, parent: StoryId, item: StoryItem) -> Result<StoryId, ModelError> {
        if self.slots.contains_key(&item.id()) {
            return Err(ModelError::DuplicateId(item.id()));
        }
        let (parent, index) = self.placement(item.kind(), parent, Position::Inside)?;
        let id = item.id();
        self.insert_slot(item, parent, index);
        Ok(id)
    }

    /// Renames one item; a blank name becomes `Unnamed`, or
    /// `Unnamed Project` for the root.
    pub fn rename_item(&mut self, id: StoryId, name: &str) -> Result<(), ModelError> {
        let fallback = if id == self.root {
            UNNAMED_PROJECT
        } else {
            UNNAMED_ITEM
        };
        self.slot_mut(id)?.item.rename_or(name, fallback);
        Ok(())
    }

    /// Updates the stored word count of one item.
    pub fn set_word_count(&mut self, id: StoryId, count: u32) -> Result<(), ModelError> {
        self.slot_mut(id)?.item.set_word_count(count);
        Ok(())
    }

    /// Word count of `id` plus all of its descendants.
    pub fn total_word_count(&self, id: StoryId) -> Result<u64, ModelError> {
        self.slot(id)?;
        Ok(self
            .traverse_from(id)
            .map(|item| u64::from(item.word_count()))
            .sum())
    }

    /// Removes `id` together with its whole subtree.
    ///
    /// Returns the removed ids in depth-first order.
    pub fn remove_item(&mut self, id: StoryId) -> Result<Vec<StoryId>, ModelError> {
        let parent = self.slot(id)?.parent;
        let Some(parent) = parent else {
            return Err(ModelError::CannotRemoveRoot(id));
        };

        let removed: Vec<StoryId> = self.traverse_from(id).map(StoryItem::id).collect();
        if let Some(parent_slot) = self.slots.get_mut(&parent) {
            parent_slot.children.retain(|child| *child != id);
        }
        for removed_id in &removed {
            self.slots.remove(removed_id);
        }
        Ok(removed)
    }

    /// Moves `id` and its subtree to a new position relative to `target`.
    ///
    /// Moving an item before or after itself leaves the tree as it is.
    ///
    /// # Errors
    /// - `UnknownTarget` when `id` or `target` does not exist.
    /// - `CyclicMove` when the destination parent is `id` or lies below it.
    /// - `InvalidNesting` when the destination parent cannot hold the item.
    pub fn move_item(
        &mut self,
        id: StoryId,
        target: StoryId,
        position: Position,
    ) -> Result<(), ModelError> {
        let kind = self.slot(id)?.item.kind();
        let target_slot = self.slot(target)?;

        let destination = match position {
            Position::Inside | Position::Here => target,
            Position::Before | Position::After => {
                if target == id {
                    return Ok(());
                }
                target_slot
                    .parent
                    .ok_or(ModelError::InvalidNesting { target, kind })?
            }
        };

        if destination == id || self.is_descendant(destination, id) {
            return Err(ModelError::CyclicMove { id, target });
        }
        if !self.slot(destination)?.item.kind().can_contain(kind) {
            return Err(ModelError::InvalidNesting {
                target: destination,
                kind,
            });
        }

        // Validation is complete; nothing below can fail.
        if let Some(old_parent) = self.parent_of(id) {
            if let Some(old_slot) = self.slots.get_mut(&old_parent) {
                old_slot.children.retain(|child| *child != id);
            }
        }

        let Some(destination_slot) = self.slots.get_mut(&destination) else {
            return Err(ModelError::UnknownTarget(destination));
        };
        let index = match position {
            Position::Inside => destination_slot.children.len(),
            Position::Here => 0,
            Position::Before | Position::After => {
                let row = destination_slot
                    .children
                    .iter()
                    .position(|child| *child == target)
                    .unwrap_or(destination_slot.children.len());
                if position == Position::After {
                    row + 1
                } else {
                    row
                }
            }
        };
        let index = index.min(destination_slot.children.len());
        destination_slot.children.insert(index, id);

        if let Some(slot) = self.slots.get_mut(&id) {
            slot.parent = Some(destination);
        }
        Ok(())
    }

    /// Depth-first, child-ordered traversal of the whole tree.
    pub fn iter(&self) -> Traverse<'_> {
        self.traverse_from(self.root)
    }

    /// Depth-first traversal of the subtree rooted at `id`.
    ///
    /// Yields nothing for unknown ids.
    pub fn traverse_from(&self, id: StoryId) -> Traverse<'_> {
        let stack = if self.slots.contains_key(&id) {
            vec![id]
        } else {
            Vec::new()
        };
        Traverse { model: self, stack }
    }

    /// Nested copy of the whole tree for read-only consumers.
    pub fn snapshot(&self) -> OutlineNode {
        self.snapshot_from(self.root)
    }

    fn snapshot_from(&self, id: StoryId) -> OutlineNode {
        let slot = &self.slots[&id];
        OutlineNode {
            id,
            kind: slot.item.kind(),
            name: slot.item.name().to_string(),
            word_count: slot.item.word_count(),
            children: slot
                .children
                .iter()
                .filter(|child| self.slots.contains_key(*child))
                .map(|child| self.snapshot_from(*child))
                .collect(),
        }
    }

    /// Re-checks every structural invariant.
    ///
    /// Returns a description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        let root = self
            .slots
            .get(&self.root)
            .ok_or_else(|| format!("root {} is missing", self.root))?;
        if root.parent.is_some() {
            return Err(format!("root {} has a parent", self.root));
        }
        if root.item.kind() != StoryKind::Book {
            return Err(format!("root {} is a {}", self.root, root.item.kind()));
        }

        let mut visited = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return Err(format!("item {id} is reachable twice"));
            }
            let slot = self
                .slots
                .get(&id)
                .ok_or_else(|| format!("item {id} is referenced but missing"))?;
            if slot.item.id() != id {
                return Err(format!("slot {id} holds item {}", slot.item.id()));
            }
            for child in &slot.children {
                let child_slot = self
                    .slots
                    .get(child)
                    .ok_or_else(|| format!("child {child} of {id} is missing"))?;
                if child_slot.parent != Some(id) {
                    return Err(format!("child {child} does not point back to {id}"));
                }
                if !slot.item.kind().can_contain(child_slot.item.kind()) {
                    return Err(format!(
                        "{} {id} cannot hold {} {child}",
                        slot.item.kind(),
                        child_slot.item.kind()
                    ));
                }
                stack.push(*child);
            }
        }

        if visited.len() != self.slots.len() {
            return Err(format!(
                "{} items are detached from the root",
                self.slots.len() - visited.len()
            ));
        }
        Ok(())
    }

    fn placement(
        &self,
        kind: StoryKind,
        target: StoryId,
        position: Position,
    ) -> Result<(StoryId, usize), ModelError> {
        let target_slot = self.slot(target)?;
        match position {
            Position::Inside | Position::Here => {
                if !target_slot.item.kind().can_contain(kind) {
                    return Err(ModelError::InvalidNesting { target, kind });
                }
                let index = if position == Position::Here {
                    0
                } else {
                    target_slot.children.len()
                };
                Ok((target, index))
            }
            Position::Before | Position::After => {
                let parent = target_slot
                    .parent
                    .ok_or(ModelError::InvalidNesting { target, kind })?;
                let parent_slot = self.slot(parent)?;
                if !parent_slot.item.kind().can_contain(kind) {
                    return Err(ModelError::InvalidNesting {
                        target: parent,
                        kind,
                    });
                }
                let row = parent_slot
                    .children
                    .iter()
                    .position(|child| *child == target)
                    .ok_or(ModelError::UnknownTarget(target))?;
                let index = if position == Position::After {
                    row + 1
                } else {
                    row
                };
                Ok((parent, index))
            }
        }
    }

    fn insert_slot(&mut self, item: StoryItem, parent: StoryId, index: usize) {
        let id = item.id();
        self.slots.insert(id, Slot::new(item, Some(parent)));
        if let Some(parent_slot) = self.slots.get_mut(&parent) {
            let index = index.min(parent_slot.children.len());
            parent_slot.children.insert(index, id);
        }
    }

    fn slot(&self, id: StoryId) -> Result<&Slot, ModelError> {
        self.slots.get(&id).ok_or(ModelError::UnknownTarget(id))
    }

    fn slot_mut(&mut self, id: StoryId) -> Result<&mut Slot, ModelError> {
        self.slots.get_mut(&id).ok_or(ModelError::UnknownTarget(id))
    }
}

/// Lazy depth-first iterator over story items.
///
/// Created by `StoryModel::iter` and `StoryModel::traverse_from`.
pub struct Traverse<'a> {
    model: &'a StoryModel,
    stack: Vec<StoryId>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a StoryItem;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let Some(slot) = self.model.slots.get(&id) else {
                continue;
            };
            self.stack.extend(slot.children.iter().rev().copied());
            return Some(&slot.item);
        }
        None
    }
}

/// Nested, owned view of an outline subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineNode {
    pub id: StoryId,
    pub kind: StoryKind,
    pub name: String,
    pub word_count: u32,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    /// Same tree without identifiers, for structural comparison.
    pub fn shape(&self) -> OutlineShape {
        OutlineShape {
            kind: self.kind,
            name: self.name.clone(),
            word_count: self.word_count,
            children: self.children.iter().map(OutlineNode::shape).collect(),
        }
    }
}

/// Identifier-free outline tree; two models are isomorphic when their
/// shapes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineShape {
    pub kind: StoryKind,
    pub name: String,
    pub word_count: u32,
    pub children: Vec<OutlineShape>,
}

#[cfg(test)]
mod tests {
    use super::{ModelError, Position, StoryModel};
    use crate::model::story_item::StoryKind;

    #[test]
    fn new_model_has_named_book_root() {
        let model = StoryModel::new("  ");
        assert_eq!(model.root().kind(), StoryKind::Book);
        assert_eq!(model.root().name(), "Unnamed Project");
        assert_eq!(model.item_count(), 1);
        assert_eq!(model.depth_of(model.root_id()), Some(0));
    }

    #[test]
    fn traversal_is_depth_first_in_child_order() {
        let mut model = StoryModel::new("Novel");
        let root = model.root_id();
        let one = model
            .add_item(StoryKind::Chapter, root, Position::Inside, Some("One"))
            .unwrap();
        let two = model
            .add_item(StoryKind::Chapter, root, Position::Inside, Some("Two"))
            .unwrap();
        model
            .add_item(StoryKind::Scene, one, Position::Inside, Some("1.1"))
            .unwrap();
        model
            .add_item(StoryKind::Scene, two, Position::Inside, Some("2.1"))
            .unwrap();

        let names: Vec<&str> = model.iter().map(|item| item.name()).collect();
        assert_eq!(names, ["Novel", "One", "1.1", "Two", "2.1"]);

        let again: Vec<&str> = model.iter().map(|item| item.name()).collect();
        assert_eq!(names, again);
    }

    #[test]
    fn validate_accepts_models_built_through_operations() {
        let mut model = StoryModel::default();
        let root = model.root_id();
        let part = model
            .add_item(StoryKind::Partition, root, Position::Inside, None)
            .unwrap();
        let chapter = model
            .add_item(StoryKind::Chapter, part, Position::Inside, None)
            .unwrap();
        model
            .add_item(StoryKind::Page, chapter, Position::Here, None)
            .unwrap();
        model.move_item(chapter, part, Position::After).unwrap();

        assert_eq!(model.validate(), Ok(()));
    }

    #[test]
    fn is_descendant_walks_parent_chain() {
        let mut model = StoryModel::default();
        let root = model.root_id();
        let chapter = model
            .add_item(StoryKind::Chapter, root, Position::Inside, None)
            .unwrap();
        let scene = model
            .add_item(StoryKind::Scene, chapter, Position::Inside, None)
            .unwrap();

        assert!(model.is_descendant(scene, root));
        assert!(model.is_descendant(scene, chapter));
        assert!(!model.is_descendant(chapter, scene));
        assert!(!model.is_descendant(root, root));
    }

    #[test]
    fn attach_rejects_duplicate_ids() {
        let mut model = StoryModel::default();
        let root = model.root_id();
        let chapter = model
            .add_item(StoryKind::Chapter, root, Position::Inside, None)
            .unwrap();
        let copy = model.get(chapter).unwrap().clone();

        let err = model.attach(root, copy).unwrap_err();
        assert_eq!(err, ModelError::DuplicateId(chapter));
        assert_eq!(model.children_of(root).unwrap(), [chapter]);
    }
}
