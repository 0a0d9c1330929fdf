// SPDX-License-Identifier: GPL-2.0-only

//! The on-disk session directory: the single source of durable state for a
//! resumable apply run (spec §3, §4.1).

pub(crate) mod author_script;
pub(crate) mod format;

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::wrap::Message;

/// Filename width for per-patch mail files, fixed per spec §3.
pub(crate) const PREC: usize = 4;

/// Errors that carry a specific, matchable meaning for the CLI layer (exit
/// code 128 cases and `BUG:`-prefixed internal-invariant violations).
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("patch format detection failed")]
    UnknownPatchFormat,
    #[error("{0}")]
    ApplyFailed(String),
    #[error("BUG: {0}")]
    Bug(String),
}

/// In-memory mirror of the durable session state (spec §3 "In-memory session
/// state").
pub(crate) struct Session {
    dir: PathBuf,
    pub(crate) cur: u32,
    pub(crate) last: u32,
    pub(crate) author_name: Vec<u8>,
    pub(crate) author_email: Vec<u8>,
    pub(crate) author_date: Vec<u8>,
    pub(crate) msg: Message,
}

impl Session {
    /// Construct a session rooted at `dir`, with all scalar state at its
    /// initial (pre-setup, pre-resume) values.
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            cur: 0,
            last: 0,
            author_name: Vec::new(),
            author_email: Vec::new(),
            author_date: Vec::new(),
            msg: Message::from(Vec::new()),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Join `rel` onto the session root.
    pub(crate) fn path(&self, rel: &str) -> PathBuf {
        self.dir.join(rel)
    }

    /// The path to the raw mail file for 1-indexed patch number `n`.
    pub(crate) fn patch_path(&self, n: u32) -> PathBuf {
        self.path(&format!("{n:0width$}", width = PREC))
    }

    /// Session presence predicate (spec §3 invariants): the session directory
    /// exists as a directory and both `next` and `last` are regular files.
    pub(crate) fn in_progress(dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Ok(false);
        }
        let next_is_file = match std::fs::metadata(dir.join("next")) {
            Ok(meta) => meta.is_file(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e).context("statting session `next` file")?,
        };
        let last_is_file = match std::fs::metadata(dir.join("last")) {
            Ok(meta) => meta.is_file(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e).context("statting session `last` file")?,
        };
        Ok(next_is_file && last_is_file)
    }

    /// Create the session directory, tolerating "already exists".
    pub(crate) fn create_dir(&self) -> Result<()> {
        match std::fs::create_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e).with_context(|| format!("creating session directory {:?}", self.dir)),
        }
    }

    /// Recursively remove the session directory (spec §3 "Lifecycle").
    pub(crate) fn destroy(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing session directory {:?}", self.dir)),
        }
    }

    /// Read a scalar file's raw bytes. `Ok(None)` means the file does not
    /// exist (a locally-recoverable, expected condition for the ephemeral
    /// per-patch files); any other I/O error is fatal.
    pub(crate) fn read_scalar_bytes(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path(rel)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading session file `{rel}`")),
        }
    }

    /// Like [`Self::read_scalar_bytes`], trimming trailing ASCII whitespace
    /// when present (used for `next`/`last`, per spec §3/§6).
    pub(crate) fn read_scalar_trimmed(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read_scalar_bytes(rel)?.map(|mut bytes| {
            while matches!(bytes.last(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
                bytes.pop();
            }
            bytes
        }))
    }

    /// Parse a `next`/`last`-style scalar: ASCII decimal, stopping at the
    /// first non-digit (spec §6 "on-disk formats").
    pub(crate) fn read_scalar_u32(&self, rel: &str) -> Result<Option<u32>> {
        let Some(bytes) = self.read_scalar_trimmed(rel)? else {
            return Ok(None);
        };
        let digits: String = bytes
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .map(|&b| b as char)
            .collect();
        if digits.is_empty() {
            return Err(Error::Bug(format!("session file `{rel}` has no leading digits")).into());
        }
        Ok(Some(digits.parse().with_context(|| {
            format!("parsing session file `{rel}` as an integer")
        })?))
    }

    /// Atomic-enough (truncate-create-write-close) write of a short scalar
    /// (spec §4.1 "write_scalar").
    pub(crate) fn write_scalar(&self, rel: &str, bytes: &[u8]) -> Result<()> {
        std::fs::write(self.path(rel), bytes)
            .with_context(|| format!("writing session file `{rel}`"))
    }

    /// Remove an ephemeral scalar file, tolerating "already absent".
    pub(crate) fn remove_scalar(&self, rel: &str) -> Result<()> {
        match std::fs::remove_file(self.path(rel)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing session file `{rel}`")),
        }
    }

    /// Load `next`/`last` and whatever author/message state survived a crash,
    /// for the "resume" path (spec §4.7).
    pub(crate) fn load(&mut self) -> Result<()> {
        self.cur = self
            .read_scalar_u32("next")?
            .ok_or_else(|| Error::Bug("resuming session missing `next`".into()))?;
        self.last = self
            .read_scalar_u32("last")?
            .ok_or_else(|| Error::Bug("resuming session missing `last`".into()))?;

        if let Some((name, email, date)) = author_script::read(self)? {
            self.author_name = name;
            self.author_email = email;
            self.author_date = date;
        }
        if let Some(msg_bytes) = self.read_scalar_bytes("final-commit")? {
            self.msg = Message::from(msg_bytes);
        }
        Ok(())
    }

    /// Persist `next`/`last` at the end of setup (spec §4.7).
    pub(crate) fn write_cursor_files(&self) -> Result<()> {
        self.write_scalar("next", self.cur.to_string().as_bytes())?;
        self.write_scalar("last", self.last.to_string().as_bytes())?;
        Ok(())
    }

    /// Advance the cursor past the just-committed (or just-skipped) patch
    /// (spec §4.6 step 8, "am_next"):
    ///
    /// `next` is rewritten *first*, then the ephemeral per-patch author/
    /// message state is cleared, so a crash between these two steps never
    /// leaves stale author data describing a patch that is no longer current.
    pub(crate) fn advance(&mut self) -> Result<()> {
        self.cur += 1;
        self.write_scalar("next", self.cur.to_string().as_bytes())?;
        self.author_name.clear();
        self.author_email.clear();
        self.author_date.clear();
        self.msg = Message::from(Vec::new());
        self.remove_scalar("author-script")?;
        self.remove_scalar("final-commit")?;
        Ok(())
    }
}
