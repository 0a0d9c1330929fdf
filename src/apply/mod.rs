// SPDX-License-Identifier: GPL-2.0-only

//! Applying a single patch's diff to the repository index, and writing a
//! tree from the result (spec §4.6 steps 6-7).

use std::path::Path;

use anyhow::Result;
use git_repository::ObjectId;

use crate::stupid::StupidContext;

/// Invokes the patch applicator (spec §4.6 step 6) and the tree writer
/// (spec §4.6 step 7, first half).
pub(crate) trait ApplyToIndex {
    /// `git apply --index <patch>`. `Err` means the patch failed to apply;
    /// the index may or may not have been partially touched, but by
    /// contract with real `git apply`, a failing invocation makes no
    /// changes.
    fn apply(&self, patch_path: &Path) -> Result<()>;

    /// Write a tree object from the current index state.
    fn write_tree(&self) -> Result<ObjectId>;
}

pub(crate) struct GitApplicator<'repo> {
    pub(crate) stupid: StupidContext<'repo>,
}

impl ApplyToIndex for GitApplicator<'_> {
    fn apply(&self, patch_path: &Path) -> Result<()> {
        self.stupid.apply_to_index(patch_path)
    }

    fn write_tree(&self) -> Result<ObjectId> {
        self.stupid.write_tree()
    }
}
