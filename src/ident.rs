// SPDX-License-Identifier: GPL-2.0-only

//! Turning the raw `Date:` header captured by the mail parser into a git
//! commit timestamp.

use anyhow::{anyhow, Context, Result};
use chrono::DateTime;

/// Parse an RFC 2822 ("Mon, 7 Jun 2021 10:00:00 +0200"-style) date, the
/// format `git mailinfo` emits for the `Date:` header, into a
/// [`git_repository::actor::Time`].
pub(crate) fn parse_mail_date(raw: &[u8]) -> Result<git_repository::actor::Time> {
    let text = std::str::from_utf8(raw)
        .with_context(|| "author date is not valid UTF-8")?
        .trim();
    let parsed = DateTime::parse_from_rfc2822(text)
        .map_err(|e| anyhow!("could not parse author date `{text}`: {e}"))?;
    Ok(git_repository::actor::Time {
        seconds: parsed.timestamp(),
        offset: parsed.offset().local_minus_utc(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typical_rfc2822_date() {
        let time = parse_mail_date(b"Mon, 7 Jun 2021 10:00:00 +0200").unwrap();
        assert_eq!(time.offset, 2 * 3600);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_mail_date(b"not a date").is_err());
    }
}
