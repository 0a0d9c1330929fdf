// SPDX-License-Identifier: GPL-2.0-only

//! Patch intake: splitting a monolithic input into numbered patch files, and
//! parsing a single patch's mail headers into author metadata and a commit
//! message (spec §4.3, §4.4).

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::{session::Session, stupid::StupidContext, wrap::Message};

/// The mail-literal author name `git send-email` and list archives use to
/// mark housekeeping traffic from mailing-list software, never a real patch
/// (spec §4.4 step 4).
const MAIL_SYSTEM_INTERNAL_DATA: &[u8] = b"Mail System Internal Data";

/// Invokes the mail-splitter (spec §4.3).
pub(crate) trait SplitPatches {
    /// Split `paths` into numbered files under `session_dir`, zero-padded to
    /// `prec` digits, returning the last (highest) index produced.
    fn split(&self, paths: &[String], session_dir: &Path, prec: usize) -> Result<u32>;
}

/// Invokes the mail-header-parser (spec §4.4 step 2).
pub(crate) trait ParseMail {
    /// Parse the mail at `patch_in`, writing the extracted body message to
    /// `msg_out` and the diff to `patch_out`. Returns the captured header
    /// output (what would be `stdout`).
    fn parse(&self, patch_in: &Path, msg_out: &Path, patch_out: &Path) -> Result<Vec<u8>>;
}

/// Invokes the "stripspace" whitespace-normalization step (spec §4.4 step 6).
pub(crate) trait NormalizeMessage {
    fn normalize(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// Production fulfillment of [`SplitPatches`], [`ParseMail`], and
/// [`NormalizeMessage`]: all three shell out to the real `git` binary via
/// [`StupidContext`] (spec §6 "Subprocess contracts").
pub(crate) struct GitIntake<'repo> {
    pub(crate) stupid: StupidContext<'repo>,
}

impl SplitPatches for GitIntake<'_> {
    fn split(&self, paths: &[String], session_dir: &Path, prec: usize) -> Result<u32> {
        self.stupid.mailsplit(paths, session_dir, prec)
    }
}

impl ParseMail for GitIntake<'_> {
    fn parse(&self, patch_in: &Path, msg_out: &Path, patch_out: &Path) -> Result<Vec<u8>> {
        self.stupid.mailinfo(patch_in, msg_out, patch_out)
    }
}

impl NormalizeMessage for GitIntake<'_> {
    fn normalize(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.stupid.stripspace(input)
    }
}

/// The author/message metadata extracted for one non-skipped patch.
pub(crate) struct ParsedPatch {
    pub(crate) msg: Message,
    pub(crate) author_name: Vec<u8>,
    pub(crate) author_email: Vec<u8>,
    pub(crate) author_date: Vec<u8>,
}

pub(crate) enum ParseOutcome {
    /// The patch was "Mail System Internal Data" housekeeping and produces no
    /// commit (spec §4.4 step 4 / §8 "Skip semantics").
    Skip,
    Patch(ParsedPatch),
}

fn append_with_separator(acc: &mut Vec<u8>, value: &[u8]) {
    if !acc.is_empty() {
        acc.push(b'\n');
    }
    acc.extend_from_slice(value);
}

/// Parse one patch's mail headers and body (spec §4.4).
///
/// `patch_path` is the raw mail file for the current patch (already known to
/// exist; the driver is responsible for the "file absent -> skip" check of
/// spec §4.6 step 2). `info_out`/`msg_out`/`patch_out` are the session's
/// `info`/`msg`/`patch` ephemeral files.
pub(crate) fn parse_patch(
    parser: &dyn ParseMail,
    normalizer: &dyn NormalizeMessage,
    session: &Session,
    patch_path: &Path,
) -> Result<ParseOutcome> {
    let msg_path = session.path("msg");
    let patch_out_path = session.path("patch");

    let info_bytes = parser
        .parse(patch_path, &msg_path, &patch_out_path)
        .with_context(|| format!("parsing mail headers for {patch_path:?}"))?;
    session.write_scalar("info", &info_bytes)?;

    // Open Question (spec §9): multi-valued Author:/Email:/Date: headers
    // would, if concatenated like Subject: is, produce an identity with
    // embedded newlines that no downstream ident formatter accepts. We keep
    // only the first occurrence of each and otherwise ignore repeats; see
    // DESIGN.md.
    let mut msg_extra: Vec<u8> = Vec::new();
    let mut author_name: Vec<u8> = Vec::new();
    let mut author_email: Vec<u8> = Vec::new();
    let mut author_date: Vec<u8> = Vec::new();

    for line in info_bytes.split(|&b| b == b'\n') {
        if let Some(rest) = line.strip_prefix(b"Subject: ") {
            append_with_separator(&mut msg_extra, rest);
        } else if let Some(rest) = line.strip_prefix(b"Author: ") {
            if author_name.is_empty() {
                author_name.extend_from_slice(rest);
            }
        } else if let Some(rest) = line.strip_prefix(b"Email: ") {
            if author_email.is_empty() {
                author_email.extend_from_slice(rest);
            }
        } else if let Some(rest) = line.strip_prefix(b"Date: ") {
            if author_date.is_empty() {
                author_date.extend_from_slice(rest);
            }
        }
        // Any other line is ignored.
    }

    if author_name == MAIL_SYSTEM_INTERNAL_DATA {
        return Ok(ParseOutcome::Skip);
    }

    let patch_len = std::fs::metadata(&patch_out_path).map(|m| m.len()).unwrap_or(0);
    if patch_len == 0 {
        return Err(anyhow!(
            "patch is empty; use `--skip` or `--abort` to continue or cancel the apply"
        ));
    }

    let msg_file_bytes = std::fs::read(&msg_path)
        .with_context(|| format!("reading patch body message {msg_path:?}"))?;

    let mut composed = msg_extra;
    composed.push(b'\n');
    composed.push(b'\n');
    composed.extend_from_slice(&msg_file_bytes);

    let normalized = normalizer
        .normalize(&composed)
        .context("normalizing composed commit message")?;

    Ok(ParseOutcome::Patch(ParsedPatch {
        msg: Message::from(normalized),
        author_name,
        author_email,
        author_date,
    }))
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-process fakes for the driver/controller unit tests, per the §9
    //! design note ("tests can substitute in-process fakes").
    use super::*;
    use std::{cell::RefCell, collections::HashMap};

    /// A fake splitter that just "discovers" a fixed last index; it does not
    /// actually write any files (callers of these fakes supply their own
    /// patch files directly in the session directory).
    pub(crate) struct FixedSplitter(pub(crate) u32);

    impl SplitPatches for FixedSplitter {
        fn split(&self, _paths: &[String], _session_dir: &Path, _prec: usize) -> Result<u32> {
            Ok(self.0)
        }
    }

    /// A fake parser driven entirely by a caller-supplied table from patch
    /// filename to canned outcome.
    pub(crate) struct TableParser {
        pub(crate) outcomes: RefCell<HashMap<String, Result<(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>)>>>,
    }

    impl ParseMail for TableParser {
        fn parse(&self, patch_in: &Path, msg_out: &Path, patch_out: &Path) -> Result<Vec<u8>> {
            let key = patch_in
                .file_name()
                .unwrap()
                .to_str()
                .unwrap()
                .to_string();
            let mut outcomes = self.outcomes.borrow_mut();
            let (info, msg, patch, _) = outcomes
                .remove(&key)
                .ok_or_else(|| anyhow!("no fake outcome registered for {key}"))??;
            std::fs::write(msg_out, &msg)?;
            std::fs::write(patch_out, &patch)?;
            Ok(info)
        }
    }

    pub(crate) struct NoopNormalizer;
    impl NormalizeMessage for NoopNormalizer {
        fn normalize(&self, input: &[u8]) -> Result<Vec<u8>> {
            Ok(input.to_vec())
        }
    }
}
