//! Outline domain model.
//!
//! # Responsibility
//! - Define the story item record and the kind nesting table.
//! - Own the ordered outline tree and all structural mutations.
//! - Carry project timestamps persisted alongside the outline.
//!
//! # Invariants
//! - Every item is identified by a stable `StoryId`.
//! - Nesting rules are enforced by the model, never corrected silently.

pub mod project_meta;
pub mod story_item;
pub mod story_model;
