// SPDX-License-Identifier: GPL-2.0-only

//! Color output helpers.
//!
//! Grounded in the teacher's `color::get_color_stdout`/`color::use_color`, which
//! gate ANSI output on both a `--color` flag and whether stdout is actually a
//! terminal (never emit color into a pipe or a redirected file).

use is_terminal::IsTerminal;
use termcolor::{ColorChoice, StandardStream};

/// Whether color output is appropriate for the current process's stdout.
///
/// There is no `--color` flag on `git am` worth adding (Non-goal: keep the CLI
/// surface narrow), so this simply reflects terminal-ness, matching the
/// `ColorChoice::Auto`-style default the teacher's commands fall back to when
/// no explicit flag is given.
pub(crate) fn use_color_stdout() -> bool {
    std::io::stdout().is_terminal()
}

pub(crate) fn get_color_stdout() -> StandardStream {
    let choice = if use_color_stdout() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}
