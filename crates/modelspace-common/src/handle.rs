//! Arena handles for spaces and cells.
//!
//! Handles are plain indices into the model's arenas. They never own the
//! object they name; a handle whose slot has been released is *stale* and
//! every engine operation on it fails with `ModelError::Stale`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle of a space (container) inside a model.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpaceId(u32);

impl SpaceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space#{}", self.0)
    }
}

/// Handle of a cells (formula-backed entry) inside a model.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CellsId(u32);

impl CellsId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CellsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cells#{}", self.0)
    }
}
