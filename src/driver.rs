// SPDX-License-Identifier: GPL-2.0-only

//! The apply/commit driver: sequences parsing, applying, and committing each
//! patch in the session, advancing the cursor as it goes (spec §4.6).

use std::io::Write;

use anyhow::{Context, Result};
use termcolor::{Color, ColorSpec, WriteColor};

use crate::{
    apply::ApplyToIndex,
    color::get_color_stdout,
    ext::{strict_identity, RepositoryExtended},
    hook,
    ident::parse_mail_date,
    intake::{self, NormalizeMessage, ParseMail, ParseOutcome},
    session::{self, author_script, Session},
};

pub(crate) struct DriverOptions {
    pub(crate) quiet: bool,
    pub(crate) committer_date_is_author_date: bool,
    pub(crate) reflog_action: String,
}

/// Run the driver until the cursor exits `[1, last]`, then destroy the
/// session (spec §4.6, final sentence).
pub(crate) fn run(
    repo: &git_repository::Repository,
    session: &mut Session,
    parser: &dyn ParseMail,
    normalizer: &dyn NormalizeMessage,
    applicator: &dyn ApplyToIndex,
    options: &DriverOptions,
) -> Result<()> {
    let mut printed_empty_history_notice = false;

    while session.cur <= session.last {
        let patch_path = session.patch_path(session.cur);

        // spec §4.6 step 2: a missing numbered file means "skip" (the
        // splitter declared it absent).
        if !patch_path.is_file() {
            session.advance()?;
            continue;
        }

        let outcome = intake::parse_patch(parser, normalizer, session, &patch_path)?;
        let parsed = match outcome {
            ParseOutcome::Skip => {
                session.advance()?;
                continue;
            }
            ParseOutcome::Patch(parsed) => parsed,
        };

        session.author_name = parsed.author_name;
        session.author_email = parsed.author_email;
        session.author_date = parsed.author_date;
        session.msg = hook::run_applypatch_msg_hook(repo, parsed.msg)?;

        author_script::write(session)?;
        session.write_scalar("final-commit", session.msg.raw_bytes())?;

        if !options.quiet {
            print_applying(session.msg.subject())?;
        }

        if let Err(e) = applicator.apply(&patch_path) {
            eprintln!(
                "Patch failed at {:0width$} {}",
                session.cur,
                session.msg.subject(),
                width = session::PREC
            );
            if advice_amworkdir_enabled(repo) {
                eprintln!("The copy of the patch that failed is found in: {patch_path:?}");
            }
            return Err(
                session::Error::ApplyFailed(format!("patch {} failed to apply: {e}", session.cur))
                    .into(),
            );
        }

        hook::run_pre_applypatch_hook(repo)?;

        let tree_id = applicator.write_tree()?;
        let parent_id = match repo.head_id() {
            Ok(id) => Some(id.detach()),
            Err(_) => {
                if !printed_empty_history_notice {
                    println!("applying to an empty history");
                    printed_empty_history_notice = true;
                }
                None
            }
        };

        let author_time = parse_mail_date(&session.author_date)
            .with_context(|| format!("patch {} has an unparseable author date", session.cur))?;
        let author = strict_identity(&session.author_name, &session.author_email, author_time)
            .with_context(|| format!("patch {} has an invalid author identity", session.cur))?;

        let mut committer = repo.get_committer()?;
        if options.committer_date_is_author_date {
            committer.time = author_time;
        }
        let committer_ref = git_repository::actor::SignatureRef {
            name: committer.name.as_ref().into(),
            email: committer.email.as_ref().into(),
            time: committer.time,
        };

        let commit_id = repo.commit_ex(
            &author,
            &committer_ref,
            session.msg.raw_bytes(),
            tree_id,
            parent_id,
        )?;

        let reflog_message = format!("{}: {}", options.reflog_action, session.msg.subject());
        update_head(repo, commit_id, &reflog_message, parent_id)?;

        hook::run_post_applypatch_hook(repo);

        session.advance()?;
    }

    session.destroy()
}

/// Print the "Applying: <subject>" progress line (spec §4.6 step 5), with
/// the "Applying:" label bolded when stdout is a terminal.
fn print_applying(subject: &bstr::BStr) -> Result<()> {
    use bstr::ByteSlice;

    let mut stdout = get_color_stdout();
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(stdout, "Applying:")?;
    stdout.reset()?;
    writeln!(stdout, " {}", subject.to_str_lossy())?;
    Ok(())
}

/// `advice.amworkdir`: unless explicitly set to `false`, print the path to
/// the failing patch on apply failure (spec §4.6 step 6).
fn advice_amworkdir_enabled(repo: &git_repository::Repository) -> bool {
    repo.config_snapshot()
        .plumbing()
        .boolean("advice", None, "amworkdir")
        .unwrap_or(Ok(true))
        .unwrap_or(true)
}

/// Update the reference `HEAD` currently points at, recording a reflog entry
/// (spec §4.6 step 7, final sentence). Fails the whole process if the update
/// cannot complete.
fn update_head(
    repo: &git_repository::Repository,
    new_commit: git_repository::ObjectId,
    reflog_message: &str,
    expected_parent: Option<git_repository::ObjectId>,
) -> Result<()> {
    let refname = repo.head_reference_name()?;
    let expected = match expected_parent {
        Some(parent) => {
            git_repository::refs::transaction::PreviousValue::ExistingMustMatch(
                git_repository::refs::Target::Peeled(parent),
            )
        }
        None => git_repository::refs::transaction::PreviousValue::MustNotExist,
    };
    repo.edit_reference(git_repository::refs::transaction::RefEdit {
        change: git_repository::refs::transaction::Change::Update {
            log: git_repository::refs::transaction::LogChange {
                mode: git_repository::refs::transaction::RefLog::AndReference,
                force_create_reflog: false,
                message: reflog_message.into(),
            },
            expected,
            new: git_repository::refs::Target::Peeled(new_commit),
        },
        name: refname,
        deref: true,
    })
    .with_context(|| "updating HEAD after commit")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap, process::Command};

    use super::*;
    use crate::{
        apply::fakes::ScriptedApplicator,
        intake::fakes::{NoopNormalizer, TableParser},
    };

    /// The well-known empty-tree object id; a valid 40-hex SHA-1 is all
    /// `commit_ex` needs to write a structurally sound commit, and none of
    /// these tests read tree contents.
    const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = Command::new("git").current_dir(dir).args(args).status().unwrap();
        assert!(status.success(), "`git {args:?}` failed");
    }

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["config", "user.name", "Committer Name"]);
        git(dir.path(), &["config", "user.email", "committer@example.com"]);
        dir
    }

    /// Opens a repository at `dir` via the same zero-argument
    /// `Repository::open()` the CLI uses for cwd discovery. Only a `chdir`,
    /// not a path argument, is an available way to point it elsewhere, so
    /// this serializes with a function-local lock to stay safe under the
    /// test harness's parallel test threads.
    fn open_repo(dir: &std::path::Path) -> git_repository::Repository {
        static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        let _guard = LOCK.lock().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let repo = git_repository::Repository::open().expect("open repo");
        std::env::set_current_dir(original).unwrap();
        repo
    }

    fn log_subjects(dir: &std::path::Path) -> Vec<String> {
        let output = Command::new("git")
            .current_dir(dir)
            .args(["log", "--format=%s"])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn session_in(dir: &std::path::Path) -> Session {
        let session = Session::new(dir.join("rebase-apply"));
        session.create_dir().unwrap();
        session
    }

    fn options() -> DriverOptions {
        DriverOptions {
            quiet: true,
            committer_date_is_author_date: false,
            reflog_action: "am".to_string(),
        }
    }

    fn patch_outcome(
        author: &str,
        email: &str,
        date: &str,
        subject: &str,
        patch_body: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>)> {
        let info =
            format!("Author: {author}\nEmail: {email}\nDate: {date}\nSubject: {subject}\n")
                .into_bytes();
        Ok((info, b"body text\n".to_vec(), patch_body.to_vec(), Vec::new()))
    }

    #[test]
    fn skip_semantics_advances_cursor_without_commit() {
        let repo_dir = init_repo();
        let repo = open_repo(repo_dir.path());
        let mut session = session_in(repo.git_dir());
        std::fs::write(session.patch_path(1), b"raw mail\n").unwrap();
        session.cur = 1;
        session.last = 1;
        session.write_cursor_files().unwrap();

        let mut outcomes = HashMap::new();
        outcomes.insert(
            "0001".to_string(),
            Ok((
                b"Author: Mail System Internal Data\nSubject: *** BOUNCE ***\n".to_vec(),
                b"\n".to_vec(),
                b"irrelevant\n".to_vec(),
                Vec::new(),
            )),
        );
        let parser = TableParser { outcomes: RefCell::new(outcomes) };
        let normalizer = NoopNormalizer;
        let applicator = ScriptedApplicator {
            results: RefCell::new(Vec::new()),
            tree_id: EMPTY_TREE.parse().unwrap(),
        };

        driver_run(&repo, &mut session, &parser, &normalizer, &applicator);

        assert_eq!(session.cur, 2, "skip still advances the cursor");
        assert!(!session.dir().exists(), "session destroyed once cursor exceeds last");
        assert!(repo.head_id().is_err(), "no commit is made for a skipped patch");
    }

    #[test]
    fn empty_patch_aborts_without_advancing_cursor() {
        let repo_dir = init_repo();
        let repo = open_repo(repo_dir.path());
        let mut session = session_in(repo.git_dir());
        std::fs::write(session.patch_path(1), b"raw mail\n").unwrap();
        session.cur = 1;
        session.last = 1;
        session.write_cursor_files().unwrap();

        let mut outcomes = HashMap::new();
        outcomes.insert(
            "0001".to_string(),
            Ok((
                b"Author: A\nEmail: a@b\nDate: d\nSubject: s\n".to_vec(),
                b"body\n".to_vec(),
                Vec::new(),
                Vec::new(),
            )),
        );
        let parser = TableParser { outcomes: RefCell::new(outcomes) };
        let normalizer = NoopNormalizer;
        let applicator = ScriptedApplicator {
            results: RefCell::new(Vec::new()),
            tree_id: EMPTY_TREE.parse().unwrap(),
        };

        let result = run(&repo, &mut session, &parser, &normalizer, &applicator, &options());

        assert!(result.is_err(), "an empty patch body must abort the run");
        assert_eq!(session.cur, 1, "cursor must not advance past an empty patch");
        assert!(repo.head_id().is_err(), "no commit is made when the patch body is empty");
    }

    #[test]
    fn two_patch_series_applies_in_order_and_destroys_session() {
        let repo_dir = init_repo();
        let repo = open_repo(repo_dir.path());
        let mut session = session_in(repo.git_dir());
        std::fs::write(session.patch_path(1), b"raw mail 1\n").unwrap();
        std::fs::write(session.patch_path(2), b"raw mail 2\n").unwrap();
        session.cur = 1;
        session.last = 2;
        session.write_cursor_files().unwrap();

        let mut outcomes = HashMap::new();
        outcomes.insert(
            "0001".to_string(),
            patch_outcome(
                "A U Thor",
                "a@example.com",
                "Mon, 7 Jun 2021 10:00:00 +0200",
                "hello",
                b"diff --git a/f b/f\n",
            ),
        );
        outcomes.insert(
            "0002".to_string(),
            patch_outcome(
                "B U Thor",
                "b@example.com",
                "Mon, 7 Jun 2021 11:00:00 +0200",
                "world",
                b"diff --git a/g b/g\n",
            ),
        );
        let parser = TableParser { outcomes: RefCell::new(outcomes) };
        let normalizer = NoopNormalizer;
        let applicator = ScriptedApplicator {
            results: RefCell::new(vec![Ok(()), Ok(())]),
            tree_id: EMPTY_TREE.parse().unwrap(),
        };

        driver_run(&repo, &mut session, &parser, &normalizer, &applicator);

        // monotone cursor: strictly increased from 1 to past `last`.
        assert_eq!(
            log_subjects(repo_dir.path()),
            vec!["world".to_string(), "hello".to_string()]
        );
        assert!(!session.dir().exists());
    }

    /// Spec §8 scenarios 3 and 5: a failure partway through a series leaves
    /// the session in a resumable state, and a fresh `Session` loaded from
    /// that same directory observes exactly that state; fixing the failure
    /// and running again completes the series.
    #[test]
    fn apply_failure_mid_series_leaves_session_intact_for_resume() {
        let repo_dir = init_repo();
        let repo = open_repo(repo_dir.path());
        let mut session = session_in(repo.git_dir());
        std::fs::write(session.patch_path(1), b"raw mail 1\n").unwrap();
        std::fs::write(session.patch_path(2), b"raw mail 2\n").unwrap();
        session.cur = 1;
        session.last = 2;
        session.write_cursor_files().unwrap();

        let mut outcomes = HashMap::new();
        outcomes.insert(
            "0001".to_string(),
            patch_outcome(
                "A U Thor",
                "a@example.com",
                "Mon, 7 Jun 2021 10:00:00 +0200",
                "hello",
                b"diff --git a/f b/f\n",
            ),
        );
        outcomes.insert(
            "0002".to_string(),
            patch_outcome(
                "B U Thor",
                "b@example.com",
                "Mon, 7 Jun 2021 11:00:00 +0200",
                "world",
                b"diff --git a/g b/g\n",
            ),
        );
        let parser = TableParser { outcomes: RefCell::new(outcomes) };
        let normalizer = NoopNormalizer;
        // `ScriptedApplicator::apply` pops from the end of `results`, so the
        // success for patch 1 (consumed first) must be the last element.
        let applicator = ScriptedApplicator {
            results: RefCell::new(vec![Err(anyhow::anyhow!("patch does not apply")), Ok(())]),
            tree_id: EMPTY_TREE.parse().unwrap(),
        };

        let result = run(&repo, &mut session, &parser, &normalizer, &applicator, &options());
        assert!(result.is_err(), "apply failure on patch 2 must fail the run");

        assert_eq!(log_subjects(repo_dir.path()), vec!["hello".to_string()]);
        assert!(Session::in_progress(session.dir()).unwrap());
        assert_eq!(session.cur, 2);

        let next = std::fs::read_to_string(session.dir().join("next")).unwrap();
        assert_eq!(next.trim(), "2");
        let last = std::fs::read_to_string(session.dir().join("last")).unwrap();
        assert_eq!(last.trim(), "2");

        let script = std::fs::read(session.dir().join("author-script")).unwrap();
        let (name, email, _date) = author_script::parse_bytes(&script).unwrap();
        assert_eq!(name, b"B U Thor");
        assert_eq!(email, b"b@example.com");

        let final_commit = std::fs::read(session.dir().join("final-commit")).unwrap();
        assert!(String::from_utf8_lossy(&final_commit).contains("world"));

        // A fresh in-memory `Session` pointed at the same directory observes
        // the same resumable state.
        let mut resumed = Session::new(session.dir().to_path_buf());
        resumed.load().unwrap();
        assert_eq!(resumed.cur, 2);
        assert_eq!(resumed.last, 2);
        assert_eq!(resumed.author_name, b"B U Thor");

        // Resuming with the fix in place completes the series.
        let mut retry_outcomes = HashMap::new();
        retry_outcomes.insert(
            "0002".to_string(),
            patch_outcome(
                "B U Thor",
                "b@example.com",
                "Mon, 7 Jun 2021 11:00:00 +0200",
                "world",
                b"diff --git a/g b/g\n",
            ),
        );
        let retry_parser = TableParser { outcomes: RefCell::new(retry_outcomes) };
        let retry_applicator = ScriptedApplicator {
            results: RefCell::new(vec![Ok(())]),
            tree_id: EMPTY_TREE.parse().unwrap(),
        };

        driver_run(&repo, &mut resumed, &retry_parser, &normalizer, &retry_applicator);

        assert_eq!(
            log_subjects(repo_dir.path()),
            vec!["world".to_string(), "hello".to_string()]
        );
        assert!(!resumed.dir().exists());
    }

    fn driver_run(
        repo: &git_repository::Repository,
        session: &mut Session,
        parser: &dyn ParseMail,
        normalizer: &dyn NormalizeMessage,
        applicator: &dyn ApplyToIndex,
    ) {
        run(repo, session, parser, normalizer, applicator, &options()).unwrap();
    }
}
