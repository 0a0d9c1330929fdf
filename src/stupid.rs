// SPDX-License-Identifier: GPL-2.0-only

//! The "stupid" layer: every place this crate shells out to the real `git`
//! binary rather than going through `gitoxide`, named after (and grounded in)
//! the teacher's own `stupid` module (`repo.stupid().diff(...)`,
//! `.interpret_trailers(...)`, `.format_patch(...)`, etc.).
//!
//! This is the concrete fulfillment of the §9 design note's capability
//! interfaces: the splitter, mail parser, and applicator are all, in
//! production, children of the `git` executable.

use std::{
    io::Write,
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{anyhow, Context, Result};
use git_repository::ObjectId;

pub(crate) struct StupidContext<'repo> {
    work_dir: Option<&'repo Path>,
    git_dir: &'repo Path,
}

impl<'repo> StupidContext<'repo> {
    pub(crate) fn new(work_dir: Option<&'repo Path>, git_dir: &'repo Path) -> Self {
        Self { work_dir, git_dir }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.env("GIT_DIR", self.git_dir);
        if let Some(work_dir) = self.work_dir {
            cmd.current_dir(work_dir);
        }
        cmd
    }

    /// `git mailsplit -d<prec> -o<dir> -b -- <paths...>`, returning the
    /// last-index integer captured from stdout (spec §4.3).
    pub(crate) fn mailsplit(&self, paths: &[String], out_dir: &Path, prec: usize) -> Result<u32> {
        let mut cmd = self.command();
        cmd.arg("mailsplit")
            .arg(format!("-d{prec}"))
            .arg("-o")
            .arg(out_dir)
            .arg("-b")
            .arg("--");
        for path in paths {
            cmd.arg(path);
        }
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .context("spawning `git mailsplit`")?;
        if !output.status.success() {
            return Err(anyhow!(
                "`git mailsplit` failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<u32>()
            .with_context(|| format!("parsing `git mailsplit` output `{text}`"))
    }

    /// `git mailinfo <msg_path> <patch_path>`, stdin = `patch_in`, stdout
    /// captured and returned as the `info` bytes (spec §4.4 step 2).
    pub(crate) fn mailinfo(
        &self,
        patch_in: &Path,
        msg_out: &Path,
        patch_out: &Path,
    ) -> Result<Vec<u8>> {
        let stdin_file =
            std::fs::File::open(patch_in).with_context(|| format!("opening {patch_in:?}"))?;
        let output = self
            .command()
            .arg("mailinfo")
            .arg(msg_out)
            .arg(patch_out)
            .stdin(stdin_file)
            .output()
            .context("spawning `git mailinfo`")?;
        if !output.status.success() {
            return Err(anyhow!(
                "`git mailinfo` failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(output.stdout)
    }

    /// `git apply --index <patch>`, run with cwd at the working tree.
    pub(crate) fn apply_to_index(&self, patch_path: &Path) -> Result<()> {
        let status = self
            .command()
            .arg("apply")
            .arg("--index")
            .arg(patch_path)
            .stdin(Stdio::null())
            .status()
            .context("spawning `git apply`")?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow!("patch does not apply"))
        }
    }

    /// `git write-tree`, returning the written tree's object id.
    pub(crate) fn write_tree(&self) -> Result<ObjectId> {
        let output = self
            .command()
            .arg("write-tree")
            .stdin(Stdio::null())
            .output()
            .context("spawning `git write-tree`")?;
        if !output.status.success() {
            return Err(anyhow!(
                "`git write-tree` failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<ObjectId>()
            .map_err(|e| anyhow!("parsing `git write-tree` output `{text}`: {e}"))
    }

    /// `git stripspace`, used to normalize the composed commit message
    /// (spec §4.4 step 6).
    pub(crate) fn stripspace(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut child = self
            .command()
            .arg("stripspace")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .context("spawning `git stripspace`")?;
        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(input)
            .context("writing to `git stripspace` stdin")?;
        let output = child
            .wait_with_output()
            .context("waiting for `git stripspace`")?;
        if !output.status.success() {
            return Err(anyhow!(
                "`git stripspace` failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(output.stdout)
    }
}
