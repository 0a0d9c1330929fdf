// SPDX-License-Identifier: GPL-2.0-only

//! `git am`: apply a series of patches from an mbox or Maildir.

mod apply;
mod color;
mod controller;
mod driver;
mod ext;
mod hook;
mod ident;
mod intake;
mod session;
mod stupid;
mod wrap;

use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Arg;

use controller::{RequestedFormat, SetupInput};
use driver::DriverOptions;

fn command() -> clap::Command {
    clap::Command::new("git-am")
        .about("Apply a series of patches from an mbox or Maildir")
        .arg(
            Arg::new("patch-format")
                .long("patch-format")
                .help("The format of the patches to be applied")
                .value_name("format"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Be quiet")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("committer-date-is-author-date")
                .long("committer-date-is-author-date")
                .help("Lie about committer date")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("mbox")
                .help("The mbox file(s) or Maildir(s) to apply, or `-` for stdin")
                .value_name("mbox")
                .num_args(0..),
        )
}

/// `_GIT_USE_BUILTIN_AM`: if unset, transparently re-exec the legacy
/// `git-am` found on `<exec-path>` with the original argv (spec §6
/// "Environment").
#[cfg(unix)]
fn maybe_reexec_legacy() -> Result<()> {
    use std::os::unix::process::CommandExt;

    if std::env::var_os("_GIT_USE_BUILTIN_AM").is_some() {
        return Ok(());
    }

    let exec_path = std::process::Command::new("git")
        .arg("--exec-path")
        .output()
        .context("locating `git --exec-path` for legacy am re-exec")?;
    if !exec_path.status.success() {
        return Err(anyhow!("`git --exec-path` failed"));
    }
    let exec_path = String::from_utf8_lossy(&exec_path.stdout).trim().to_string();
    let legacy = std::path::Path::new(&exec_path).join("git-am");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let err = std::process::Command::new(&legacy).args(&args).exec();
    // `exec` only returns on failure.
    Err(anyhow!("re-executing legacy `{legacy:?}`: {err}"))
}

#[cfg(not(unix))]
fn maybe_reexec_legacy() -> Result<()> {
    Ok(())
}

fn run() -> Result<()> {
    maybe_reexec_legacy()?;

    let matches = command().get_matches();

    let format = match matches.get_one::<String>("patch-format").map(String::as_str) {
        None => RequestedFormat::Auto,
        Some("mbox") => RequestedFormat::Mbox,
        Some(other) => {
            return Err(anyhow!(
                "invalid --patch-format `{other}`: only `mbox` is supported"
            ))
        }
    };

    let repo = git_repository::Repository::open().context("discovering the git repository")?;

    // Positional paths are resolved relative to the caller's prefix (spec §6
    // "CLI"); since this process never changes its working directory, the
    // paths as given are already correct relative to the caller's cwd, which
    // is exactly the prefix the spec describes. Only `-` (stdin) is special,
    // and it is handled by the format detector and splitter directly.
    let paths: Vec<String> = matches
        .get_many::<String>("mbox")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let reflog_action =
        std::env::var("GIT_REFLOG_ACTION").unwrap_or_else(|_| "am".to_string());

    let options = DriverOptions {
        quiet: matches.get_flag("quiet"),
        committer_date_is_author_date: matches.get_flag("committer-date-is-author-date"),
        reflog_action,
    };

    controller::run(
        &repo,
        Some(SetupInput { paths, format }),
        &options,
    )
}

/// Every unrecoverable failure path in this crate (format detection,
/// malformed session state, apply failure, commit/ref-update failure) exits
/// 128, matching real `git am` (spec §6 "Exit codes").
fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for (i, cause) in e.chain().enumerate() {
                if i == 0 {
                    eprintln!("error: {cause}");
                } else {
                    eprintln!("  caused by: {cause}");
                }
            }
            ExitCode::from(128)
        }
    }
}
