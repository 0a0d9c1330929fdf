// SPDX-License-Identifier: GPL-2.0-only

//! Extension trait filling gaps in `gitoxide`'s [`git_repository::Repository`]
//! for the needs of the apply/commit driver.
//!
//! Grounded in the teacher's own `ext::RepositoryExtended` pattern (as used
//! throughout `cmd/pick.rs`, `cmd/reset.rs`, `stack/stack.rs`): rather than
//! reimplement object-graph primitives gitoxide already exposes, this trait
//! only adds the small amount of glue gitoxide doesn't provide directly.

use anyhow::{anyhow, Context, Result};
use git_repository::{actor::SignatureRef, objs::Commit as CommitObj, ObjectId};

/// Extensions to [`git_repository::Repository`].
pub(crate) trait RepositoryExtended {
    /// Write a commit object directly, bypassing gitoxide's higher-level
    /// `Repository::commit` convenience (which always uses the repository's
    /// configured identity). The apply/commit driver needs an explicit author
    /// drawn from parsed mail headers and a possibly-adjusted committer.
    fn commit_ex(
        &self,
        author: &SignatureRef<'_>,
        committer: &SignatureRef<'_>,
        message: &[u8],
        tree: ObjectId,
        parents: impl IntoIterator<Item = ObjectId>,
    ) -> Result<ObjectId>;

    /// The committer identity gitoxide would use by default (from config/env),
    /// as an owned signature so it can be adjusted (e.g.
    /// `--committer-date-is-author-date`) before being passed to [`commit_ex`].
    fn get_committer(&self) -> Result<git_repository::actor::Signature>;

    /// The fully-qualified name of the reference `HEAD` currently points at
    /// (e.g. `refs/heads/main`), or `HEAD` itself when detached.
    fn head_reference_name(&self) -> Result<git_repository::refs::FullName>;
}

impl RepositoryExtended for git_repository::Repository {
    fn commit_ex(
        &self,
        author: &SignatureRef<'_>,
        committer: &SignatureRef<'_>,
        message: &[u8],
        tree: ObjectId,
        parents: impl IntoIterator<Item = ObjectId>,
    ) -> Result<ObjectId> {
        let commit = CommitObj {
            tree,
            parents: parents.into_iter().collect(),
            author: author.to_owned(),
            committer: committer.to_owned(),
            encoding: None,
            message: message.into(),
            extra_headers: Vec::new(),
        };
        Ok(self
            .write_object(&commit)
            .context("writing commit object")?
            .detach())
    }

    fn get_committer(&self) -> Result<git_repository::actor::Signature> {
        self.committer()
            .ok_or_else(|| anyhow!("committer identity is not configured"))?
            .context("determining committer identity")
    }

    fn head_reference_name(&self) -> Result<git_repository::refs::FullName> {
        match self.head()?.referent_name() {
            Some(name) => Ok(name.into()),
            None => git_repository::refs::FullName::try_from("HEAD")
                .map_err(|e| anyhow!("invalid HEAD reference: {e}")),
        }
    }
}

/// Validate that an author/committer identity has a non-empty name and email,
/// per §4.6 step 7's "format an author identity ... using strict validation".
pub(crate) fn strict_identity<'a>(
    name: &'a [u8],
    email: &'a [u8],
    time: git_repository::actor::Time,
) -> Result<SignatureRef<'a>> {
    if name.is_empty() {
        return Err(anyhow!("empty ident name not allowed"));
    }
    if email.is_empty() {
        return Err(anyhow!("empty ident email not allowed"));
    }
    if name.contains(&b'\n') || email.contains(&b'\n') || email.contains(&b'>') {
        return Err(anyhow!("ident name or email contains disallowed bytes"));
    }
    Ok(SignatureRef {
        name: name.into(),
        email: email.into(),
        time,
    })
}
