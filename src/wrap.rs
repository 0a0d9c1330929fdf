// SPDX-License-Identifier: GPL-2.0-only

//! Thin wrappers around byte-string-ish values exchanged with external tools.

use bstr::{BString, ByteSlice};

/// A commit message.
///
/// Kept as an owned byte string rather than a `String` because mail bodies
/// are not guaranteed to be valid UTF-8 until `git mailinfo` and `git
/// stripspace` have had their say, and even then a byte string composes more
/// simply with the subprocess boundary than a `String` would.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Message(BString);

impl Message {
    pub(crate) fn raw_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// The first line of the message, used for progress and diagnostic output.
    pub(crate) fn subject(&self) -> &bstr::BStr {
        self.0
            .find_byte(b'\n')
            .map(|pos| self.0[..pos].as_bstr())
            .unwrap_or_else(|| self.0.as_bstr())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(BString::from(bytes))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self(BString::from(s))
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_str_lossy())
    }
}
