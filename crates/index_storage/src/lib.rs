//! Storage primitives for named on-disk index fragments.
//!
//! A fragment is identified by an [`IndexName`] within a location (a
//! directory). The [`IndexStorage`] trait is the only way the indexing
//! pipeline touches fragments on disk: open, create, close, delete and
//! rename. [`LocalDirIndexStorage`] keeps every structure of a fragment as a
//! file named `<name>.<structure>` inside the location.

mod handle;
mod local;
mod name;
mod properties;
mod storage;

pub use crate::{
    handle::IndexHandle,
    local::LocalDirIndexStorage,
    name::IndexName,
    properties::{
        IndexProperties,
        PROPERTIES_STRUCTURE,
    },
    storage::IndexStorage,
};
