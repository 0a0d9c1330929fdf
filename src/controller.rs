// SPDX-License-Identifier: GPL-2.0-only

//! The session controller: the top-level orchestrator that decides
//! setup-vs-resume, drives the apply/commit loop, and destroys the session on
//! completion (spec §4.7).

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    apply::GitApplicator,
    driver::{self, DriverOptions},
    intake::{GitIntake, SplitPatches},
    session::{format, Error, Session, PREC},
    stupid::StupidContext,
};

/// The caller-requested patch format. `git am` only ever accepts the literal
/// string `mbox` for `--patch-format` (spec §6); absence means "detect it".
pub(crate) enum RequestedFormat {
    Auto,
    Mbox,
}

pub(crate) struct SetupInput {
    pub(crate) paths: Vec<String>,
    pub(crate) format: RequestedFormat,
}

/// Run the controller: initialize the session at
/// `<repo-metadata>/rebase-apply`, resume or set up as appropriate, then run
/// the driver to completion (spec §4.7).
pub(crate) fn run(
    repo: &git_repository::Repository,
    setup: Option<SetupInput>,
    options: &DriverOptions,
) -> Result<()> {
    let session_dir: PathBuf = repo.git_dir().join("rebase-apply");
    let mut session = Session::new(session_dir);

    let intake = GitIntake {
        stupid: StupidContext::new(repo.work_dir(), repo.git_dir()),
    };
    let applicator = GitApplicator {
        stupid: StupidContext::new(repo.work_dir(), repo.git_dir()),
    };

    if Session::in_progress(session.dir())? {
        session
            .load()
            .context("resuming an in-progress am session")?;
    } else {
        let setup = setup.ok_or_else(|| {
            Error::Bug("no session in progress and no setup input provided".to_string())
        })?;
        set_up(&intake, &mut session, setup)?;
    }

    driver::run(
        repo,
        &mut session,
        &intake,
        &intake,
        &applicator,
        options,
    )
}

/// Set up a brand-new session: resolve the format, create the session
/// directory, run the splitter, and persist the initial cursor files (spec
/// §4.7 "Otherwise, set up a new session"). Takes the splitter as a
/// capability interface (per the §9 design note) so setup logic can be
/// exercised with an in-process fake.
fn set_up(
    splitter: &dyn SplitPatches,
    session: &mut Session,
    setup: SetupInput,
) -> Result<()> {
    let detected = match setup.format {
        RequestedFormat::Mbox => format::PatchFormat::Mbox,
        RequestedFormat::Auto => format::detect(&setup.paths)?,
    };
    if detected == format::PatchFormat::Unknown {
        return Err(Error::UnknownPatchFormat.into());
    }

    session.create_dir().context("creating am session")?;

    let result: Result<()> = (|| {
        let last = splitter
            .split(&setup.paths, session.dir(), PREC)
            .context("splitting input into patches")?;
        session.cur = 1;
        session.last = last;
        session.write_cursor_files()?;
        Ok(())
    })();

    if let Err(e) = result {
        // spec §4.7: "On any failure after directory creation, destroy the
        // session and abort."
        let _ = session.destroy();
        return Err(e);
    }

    Ok(())
}
