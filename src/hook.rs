// SPDX-License-Identifier: GPL-2.0-only

//! Support for using git repository hooks.
//!
//! Generalized from the teacher's `pre-commit`/`commit-msg` hook support to the
//! three hooks real `git am` runs: `applypatch-msg`, `pre-applypatch`, and
//! `post-applypatch` (see SPEC_FULL.md §4.8). Hook discovery (`core.hookspath`,
//! bare-vs-worktree resolution, executable-bit check) is unchanged.

use std::{io::Write, path::PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::wrap::Message;

/// Find path to hook script given a hook name.
fn get_hook_path(repo: &git_repository::Repository, hook_name: &str) -> Result<PathBuf> {
    let config = repo.config_snapshot();
    let hooks_root = config
        .trusted_path("core.hookspath")
        .transpose()?
        .map_or_else(
            // No core.hookspath, use default .git/hooks location:
            || Ok(repo.git_dir().join("hooks")),
            |hooks_path| {
                if hooks_path.is_absolute() {
                    Ok(hooks_path.into())
                } else if repo.is_bare() {
                    // .git directory is used in case of a bare repo:
                    Ok(repo.git_dir().join(hooks_path))
                } else {
                    // the root of the working tree is used in case of a non-bare repo:
                    if let Some(work_dir) = repo.work_dir() {
                        Ok(work_dir.join(hooks_path))
                    } else {
                        Err(anyhow!("No workdir found"))
                    }
                }
            },
        )?;
    Ok(hooks_root.join(hook_name))
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

/// Whether `hook_name` exists, is a regular file, and is executable.
fn hook_runnable(repo: &git_repository::Repository, hook_name: &str) -> Result<Option<PathBuf>> {
    let hook_path = get_hook_path(repo, hook_name)?;
    let hook_meta = match std::fs::metadata(&hook_path) {
        Ok(meta) => meta,
        Err(_) => return Ok(None), // ignore missing hook
    };
    if !hook_meta.is_file() || !is_executable(&hook_meta) {
        return Ok(None);
    }
    Ok(Some(hook_path))
}

/// Run the `applypatch-msg` hook, which may rewrite the commit message before
/// it is used. Invoked with the path to a file holding the message as
/// `argv[1]`; a non-zero exit fails the whole apply of the current patch.
pub(crate) fn run_applypatch_msg_hook(
    repo: &git_repository::Repository,
    message: Message,
) -> Result<Message> {
    let hook_name = "applypatch-msg";
    let Some(hook_path) = hook_runnable(repo, hook_name)? else {
        return Ok(message);
    };

    let mut msg_file = tempfile::NamedTempFile::new()?;
    msg_file.write_all(message.raw_bytes())?;
    let msg_file_path = msg_file.into_temp_path();

    let status = std::process::Command::new(&hook_path)
        .arg(&msg_file_path)
        .status()
        .with_context(|| format!("`{hook_name}` hook"))?;

    if status.success() {
        let message_bytes = std::fs::read(&msg_file_path)?;
        Ok(Message::from(message_bytes))
    } else {
        Err(anyhow!(
            "`{hook_name}` hook returned {}",
            status.code().unwrap_or(-1)
        ))
    }
}

/// Run the `pre-applypatch` hook after `git apply --index` has succeeded but
/// before the commit is written. A non-zero exit aborts the patch (the index
/// has already been updated; the session is left intact for resume).
pub(crate) fn run_pre_applypatch_hook(repo: &git_repository::Repository) -> Result<()> {
    let hook_name = "pre-applypatch";
    let Some(hook_path) = hook_runnable(repo, hook_name)? else {
        return Ok(());
    };
    let workdir = repo
        .work_dir()
        .expect("should not get this far with a bare repo");
    let status = std::process::Command::new(hook_path)
        .current_dir(workdir)
        .stdin(std::process::Stdio::null())
        .status()
        .with_context(|| format!("`{hook_name}` hook"))?;
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!(
            "`{hook_name}` hook returned {}",
            status.code().unwrap_or(-1)
        ))
    }
}

/// Run the `post-applypatch` hook after the commit and `HEAD` update for a
/// patch that was applied (not skipped). Failure here is advisory only: it is
/// reported to stderr but does not fail the run.
pub(crate) fn run_post_applypatch_hook(repo: &git_repository::Repository) {
    let hook_name = "post-applypatch";
    match hook_runnable(repo, hook_name) {
        Ok(Some(hook_path)) => {
            let workdir = repo.work_dir();
            let result = std::process::Command::new(hook_path)
                .current_dir(workdir.unwrap_or_else(|| repo.git_dir()))
                .stdin(std::process::Stdio::null())
                .status();
            match result {
                Ok(status) if !status.success() => {
                    eprintln!(
                        "warning: `{hook_name}` hook returned {}",
                        status.code().unwrap_or(-1)
                    );
                }
                Err(e) => eprintln!("warning: `{hook_name}` hook: {e}"),
                Ok(_) => {}
            }
        }
        Ok(None) => {}
        Err(e) => eprintln!("warning: checking for `{hook_name}` hook: {e}"),
    }
}
