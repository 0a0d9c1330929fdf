// SPDX-License-Identifier: GPL-2.0-only

//! The `author-script` wire format: a strict, three-line POSIX-shell
//! sourceable fragment carrying the author identity for the patch currently
//! being applied (spec §4.5).

use anyhow::{anyhow, Result};

use super::Session;

const NAME_PREFIX: &[u8] = b"GIT_AUTHOR_NAME=";
const EMAIL_PREFIX: &[u8] = b"GIT_AUTHOR_EMAIL=";
const DATE_PREFIX: &[u8] = b"GIT_AUTHOR_DATE=";

/// POSIX single-quote a value: wrap in `'...'`, encoding any embedded `'` as
/// `'\''`.
fn single_quote(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 2);
    out.push(b'\'');
    for &b in value {
        if b == b'\'' {
            out.extend_from_slice(b"'\\''");
        } else {
            out.push(b);
        }
    }
    out.push(b'\'');
    out
}

/// Parse a single-quoted value starting at `input[0]` (which must be `'`),
/// returning the dequoted value and the number of bytes consumed.
fn single_dequote(input: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut iter = input.iter().enumerate();
    match iter.next() {
        Some((_, b'\'')) => {}
        _ => return Err(anyhow!("expected opening quote")),
    }
    let mut value = Vec::new();
    loop {
        match iter.next() {
            None => return Err(anyhow!("unterminated single-quoted value")),
            Some((i, b'\'')) => {
                // Possibly an escaped quote: `'\''`.
                if input[i + 1..].starts_with(b"\\'") {
                    value.push(b'\'');
                    // Consume the two escape bytes and the re-opening quote.
                    iter.next();
                    iter.next();
                    match iter.next() {
                        Some((_, b'\'')) => continue,
                        _ => return Err(anyhow!("malformed quote escape")),
                    }
                } else {
                    return Ok((value, i + 1));
                }
            }
            Some((_, &b)) => value.push(b),
        }
    }
}

fn write_line(out: &mut Vec<u8>, prefix: &[u8], value: &[u8]) {
    out.extend_from_slice(prefix);
    out.extend_from_slice(&single_quote(value));
    out.push(b'\n');
}

/// Serialize the author triple. Produces exactly three lines, each
/// terminated by `\n`, and nothing else.
pub(crate) fn write_bytes(name: &[u8], email: &[u8], date: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_line(&mut out, NAME_PREFIX, name);
    write_line(&mut out, EMAIL_PREFIX, email);
    write_line(&mut out, DATE_PREFIX, date);
    out
}

fn parse_line<'a>(input: &'a [u8], prefix: &[u8]) -> Result<(Vec<u8>, &'a [u8])> {
    let rest = input
        .strip_prefix(prefix)
        .ok_or_else(|| anyhow!("author script: expected line starting with {prefix:?}"))?;
    let (value, consumed) = single_dequote(rest)?;
    let rest = &rest[consumed..];
    let rest = rest
        .strip_prefix(b"\n")
        .ok_or_else(|| anyhow!("author script: expected newline after quoted value"))?;
    Ok((value, rest))
}

/// Strictly parse an `author-script` byte string: exactly three lines in
/// order, each well-formed, with no trailing bytes after the third.
pub(crate) fn parse_bytes(input: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let (name, rest) = parse_line(input, NAME_PREFIX)?;
    let (email, rest) = parse_line(rest, EMAIL_PREFIX)?;
    let (date, rest) = parse_line(rest, DATE_PREFIX)?;
    if !rest.is_empty() {
        return Err(anyhow!("author script: unexpected trailing data"));
    }
    Ok((name, email, date))
}

/// Write `author-script` for the session's current author triple.
pub(crate) fn write(session: &Session) -> Result<()> {
    let bytes = write_bytes(
        &session.author_name,
        &session.author_email,
        &session.author_date,
    );
    session.write_scalar("author-script", &bytes)
}

/// Read and strictly parse `author-script`, if present. Absence is
/// permitted (treated as "no author state yet"); a malformed file is a
/// fatal error (we never guess author identity).
pub(crate) fn read(session: &Session) -> Result<Option<(Vec<u8>, Vec<u8>, Vec<u8>)>> {
    match session.read_scalar_bytes("author-script")? {
        None => Ok(None),
        Some(bytes) => Ok(Some(parse_bytes(&bytes)?)),
    }
}
