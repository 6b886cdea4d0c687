//! Create-vs-update state of an entity.
//!
//! An entity is either [`Persisted::Unsaved`] (no identity yet, only the create
//! path applies) or [`Saved`] (store-assigned identity plus the change tag that
//! the modify path must send back).

use crate::backend::storage::record::{ChangeTag, RecordId, RecordMeta};

/// An entity the store has accepted, with its identity and change tag
#[derive(Debug, Clone, PartialEq)]
pub struct Saved<T> {
    pub meta: RecordMeta,
    pub value: T,
}

impl<T> Saved<T> {
    pub fn new(meta: RecordMeta, value: T) -> Self {
        Self { meta, value }
    }

    pub fn id(&self) -> &RecordId {
        &self.meta.id
    }

    pub fn change_tag(&self) -> ChangeTag {
        self.meta.change_tag
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Either a brand-new entity or one that already has a remote identity
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted<T> {
    Unsaved(T),
    Saved(Saved<T>),
}

impl<T> Persisted<T> {
    pub fn value(&self) -> &T {
        match self {
            Persisted::Unsaved(value) => value,
            Persisted::Saved(saved) => &saved.value,
        }
    }

    pub fn id(&self) -> Option<&RecordId> {
        match self {
            Persisted::Unsaved(_) => None,
            Persisted::Saved(saved) => Some(saved.id()),
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Persisted::Saved(_))
    }
}

impl<T> From<Saved<T>> for Persisted<T> {
    fn from(saved: Saved<T>) -> Self {
        Persisted::Saved(saved)
    }
}
