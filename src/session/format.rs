// SPDX-License-Identifier: GPL-2.0-only

//! Patch-format auto-detection (spec §4.2).

use std::{
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PatchFormat {
    Mbox,
    Unknown,
}

/// Detect the patch format of the first of `paths` (or the defaults for
/// stdin/empty/directory inputs), per spec §4.2.
pub(crate) fn detect(paths: &[String]) -> Result<PatchFormat> {
    let first = paths.first();

    // Rule 1: empty list, "-", or a directory all default to Mbox.
    let Some(first) = first else {
        return Ok(PatchFormat::Mbox);
    };
    if first == "-" {
        return Ok(PatchFormat::Mbox);
    }
    if Path::new(first).is_dir() {
        return Ok(PatchFormat::Mbox);
    }

    // Rule 2: read the first three non-blank lines, trimmed.
    let lines = first_non_blank_lines(first, 3)
        .with_context(|| format!("reading `{first}` to detect patch format"))?;

    // Rule 3: cheap prefix check on line 1, before the (more expensive)
    // is_email scan -- ordering is significant, see spec §9 open question.
    if let Some(first_line) = lines.first() {
        if first_line.starts_with("From ") || first_line.starts_with("From: ") {
            return Ok(PatchFormat::Mbox);
        }
    }

    // Rule 4: all three lines non-empty and is_email holds.
    if lines.len() == 3 && is_email(first)? {
        return Ok(PatchFormat::Mbox);
    }

    Ok(PatchFormat::Unknown)
}

fn first_non_blank_lines(path: &str, n: usize) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::with_capacity(n);
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        out.push(trimmed);
        if out.len() == n {
            break;
        }
    }
    Ok(out)
}

/// A byte is in the allowed "header key" class: printable ASCII excluding
/// space (0x20) and colon (0x3A), i.e. `0x21..=0x39` or `0x3B..=0x7E`.
fn is_header_key_byte(b: u8) -> bool {
    matches!(b, 0x21..=0x39 | 0x3B..=0x7E)
}

/// Scan the header-area lines of `path` (those preceding the first empty
/// line), checking each non-folded line has the shape `key:` where `key` is
/// one or more header-key-class bytes. EOF or an empty line terminates
/// scanning positively.
fn is_email(path: &str) -> Result<bool> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            return Ok(true);
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header; skip.
            continue;
        }
        let bytes = line.as_bytes();
        let Some(colon_pos) = bytes.iter().position(|&b| b == b':') else {
            return Ok(false);
        };
        if colon_pos == 0 {
            return Ok(false);
        }
        if !bytes[..colon_pos].iter().all(|&b| is_header_key_byte(b)) {
            return Ok(false);
        }
    }
    Ok(true)
}
