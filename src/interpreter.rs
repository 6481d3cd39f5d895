//! The script interpreter: a two-phase state machine that assembles the
//! target program's argument vector from a line-oriented stream.
//!
//! Grammar: `OPTIONS* "--" ARGV*`. Option lines reuse the exact option table
//! that parses the invoking command line; argument lines are taken one per
//! line, with a configured replace-marker line splicing in the invoking
//! trailing arguments.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::ffi::OsStringExt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use tracing::{debug, error, warn};

use crate::argvec::ArgVec;
use crate::command::{Command, Config, ExitCode};
use crate::executor;
use crate::options::{self, OPTION_ERROR_LIMIT, ParsedLine};
use crate::reader::LineBuffer;
use crate::setup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Options,
    Argv,
    Eof,
}

/// What the state machine produced once the stream ran out.
#[derive(Debug)]
enum Assembly {
    /// A nonempty argument vector; run it.
    Run(ArgVec),
    /// `-h`/`--help` on an option line: usage text, stop without running.
    Help(String),
    /// Stream ended before any argument was accepted; a no-op.
    Empty,
}

/// Interpret the script file at `path`.
pub fn run_script(cmd: &mut Command, cfg: &mut Config, path: &Path) -> Result<ExitCode> {
    if path.is_dir() {
        return Err(anyhow::Error::new(Errno::EISDIR)
            .context(format!("cannot interpret '{}'", path.display())));
    }
    let file =
        File::open(path).with_context(|| format!("cannot open script '{}'", path.display()))?;
    interpret(cmd, cfg, BufReader::new(file))
}

/// Interpret a script stream and, if it assembles a nonzero argument
/// vector, execute it.
pub fn interpret<R: BufRead>(cmd: &mut Command, cfg: &mut Config, stream: R) -> Result<ExitCode> {
    let mut lines = LineBuffer::new(stream);
    let argv = match assemble(cmd, cfg, &mut lines)? {
        Assembly::Run(argv) => argv,
        Assembly::Help(text) => {
            print!("{text}");
            return Ok(0);
        }
        Assembly::Empty => return Ok(0),
    };

    cmd.set_target(argv.into_vec());

    // Option lines may have added setup work the command line did not have.
    setup::prepare(cmd);
    if let Some(errno) = cmd.ioerr {
        error!("i/o setup failed: {errno}");
        return Ok(2);
    }

    if cfg.show_argv {
        show_argv(cmd);
    }
    Ok(executor::run_program(cmd)?)
}

/// Drive the state machine over the stream and build the argument vector.
fn assemble<R: BufRead>(
    cmd: &mut Command,
    cfg: &mut Config,
    lines: &mut LineBuffer<R>,
) -> Result<Assembly> {
    let mut errors = 0usize;
    let mut section = Section::Options;

    // Phase 1: option lines, up to "--" or end of stream.
    while section == Section::Options {
        if !lines.read_decoded(cfg.encoding)? {
            section = Section::Eof;
            break;
        }
        let line = lines.line();
        if line.is_empty() || line[0] == b'#' {
            continue;
        }
        if line == b"--" {
            section = Section::Argv;
            break;
        }
        match parse_option_line(cmd, cfg, line) {
            LineOutcome::Applied => {}
            LineOutcome::Help(text) => return Ok(Assembly::Help(text)),
            LineOutcome::Bad => {
                errors += 1;
                if errors > OPTION_ERROR_LIMIT {
                    bail!("too many option errors in script");
                }
            }
        }
    }

    if section == Section::Eof {
        return Ok(Assembly::Empty);
    }

    // Everything after the invoking program name, for the replace marker
    // and for append mode.
    let trailing: Vec<OsString> = cmd.argv.iter().skip(1).cloned().collect();

    // Phase 2: argument lines, one per line, until end of stream.
    let mut argv = ArgVec::new();
    let mut in_argv = false;
    loop {
        if !lines.read_decoded(cfg.encoding)? {
            break;
        }
        let line = lines.line();

        // Leading blank lines and comments after "--" are tolerated; once
        // the first real argument arrives, every line is literal, since an
        // argument may itself be blank or start with '#'.
        if !in_argv {
            if line.is_empty() || line[0] == b'#' {
                continue;
            }
            in_argv = true;
        }

        let is_marker = matches!(&cfg.replace, Some(marker) if marker.as_bytes() == line);
        if is_marker {
            splice(&mut argv, &trailing)?;
        } else {
            argv.reserve(1)?;
            argv.push(OsString::from_vec(line.to_vec()));
        }
    }

    if cfg.append_argv {
        splice(&mut argv, &trailing)?;
    }

    if argv.is_empty() {
        Ok(Assembly::Empty)
    } else {
        // The terminating null slot is supplied by the CString vector the
        // executor builds at exec time.
        Ok(Assembly::Run(argv))
    }
}

enum LineOutcome {
    Applied,
    Help(String),
    Bad,
}

fn parse_option_line(cmd: &mut Command, cfg: &mut Config, line: &[u8]) -> LineOutcome {
    // Lines that are none of blank, comment, "--", or option syntax are
    // malformed; they are diagnosed and counted, not silently ignored.
    if line[0] != b'-' {
        warn!(
            "script line '{}' is not an option line",
            String::from_utf8_lossy(line)
        );
        return LineOutcome::Bad;
    }
    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(_) => {
            warn!("option line is not valid UTF-8");
            return LineOutcome::Bad;
        }
    };
    match options::parse_line(text) {
        Ok(ParsedLine::Options(args)) => {
            debug!("script option: {text}");
            args.apply(cmd, cfg);
            LineOutcome::Applied
        }
        Ok(ParsedLine::Help(output)) => LineOutcome::Help(output),
        Err(message) => {
            warn!("bad option line '{text}': {}", message.trim_end());
            LineOutcome::Bad
        }
    }
}

fn splice(argv: &mut ArgVec, trailing: &[OsString]) -> Result<()> {
    if trailing.is_empty() {
        return Ok(());
    }
    argv.reserve(trailing.len())?;
    for arg in trailing {
        argv.push(arg.clone());
    }
    Ok(())
}

/// Print the argument vector, one slot per line, to the diagnostic stream.
/// Values are printed as-is, not quoted or escaped.
pub fn show_argv(cmd: &Command) {
    for (i, arg) in cmd.argv.iter().enumerate() {
        eprintln!("argv[{i}] = {}", arg.to_string_lossy());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Encoding;
    use std::io::Cursor;

    fn assemble_script(
        script: &[u8],
        cmd: &mut Command,
        cfg: &mut Config,
    ) -> Result<Option<Vec<OsString>>> {
        let mut lines = LineBuffer::new(Cursor::new(script.to_vec()));
        match assemble(cmd, cfg, &mut lines)? {
            Assembly::Run(argv) => Ok(Some(argv.into_vec())),
            _ => Ok(None),
        }
    }

    fn os(s: &str) -> OsString {
        OsString::from(s)
    }

    #[test]
    fn plain_argv_assembly() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let argv = assemble_script(b"--\nfoo\nbar\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert_eq!(argv, vec![os("foo"), os("bar")]);
    }

    #[test]
    fn option_line_before_separator_applies() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let argv = assemble_script(b"-d\n--\nfoo\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert!(cmd.debug);
        assert_eq!(argv, vec![os("foo")]);
    }

    #[test]
    fn comments_and_blanks_skipped_in_options() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let argv = assemble_script(b"# header\n\n--fork\n\n--\nfoo\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert!(cmd.fork);
        assert_eq!(argv, vec![os("foo")]);
    }

    #[test]
    fn leading_blanks_after_separator_skipped_then_literal() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let argv = assemble_script(b"--\n\n# note\nfoo\n\n#literal\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        // Once "foo" is accepted, the blank line and the '#' line are real
        // arguments.
        assert_eq!(argv, vec![os("foo"), os(""), os("#literal")]);
    }

    #[test]
    fn eof_before_separator_is_a_noop() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        assert!(
            assemble_script(b"# nothing here\n-v\n", &mut cmd, &mut cfg)
                .unwrap()
                .is_none()
        );
        assert!(cmd.verbose);
    }

    #[test]
    fn empty_argv_section_is_a_noop() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        assert!(
            assemble_script(b"--\n\n# only comments\n", &mut cmd, &mut cfg)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn replace_marker_splices_invoking_arguments() {
        let mut cmd = Command::default();
        cmd.argv = vec![os("script.ush"), os("x"), os("y")];
        let mut cfg = Config {
            replace: Some("%%ARGS%%".to_string()),
            ..Config::default()
        };
        let argv = assemble_script(b"--\nfoo\n%%ARGS%%\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert_eq!(argv, vec![os("foo"), os("x"), os("y")]);
    }

    #[test]
    fn replace_marker_with_no_trailing_args_vanishes() {
        let mut cmd = Command::default();
        cmd.argv = vec![os("script.ush")];
        let mut cfg = Config {
            replace: Some("%%ARGS%%".to_string()),
            ..Config::default()
        };
        let argv = assemble_script(b"--\nfoo\n%%ARGS%%\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert_eq!(argv, vec![os("foo")]);
    }

    #[test]
    fn append_argv_adds_trailing_arguments_at_eof() {
        let mut cmd = Command::default();
        cmd.argv = vec![os("script.ush"), os("x")];
        let mut cfg = Config {
            append_argv: true,
            ..Config::default()
        };
        let argv = assemble_script(b"--\nfoo\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert_eq!(argv, vec![os("foo"), os("x")]);
    }

    #[test]
    fn encoding_option_line_applies_to_later_lines() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let argv = assemble_script(b"--encoding=xnn\n--\nfoo\\x20bar\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert_eq!(argv, vec![os("foo bar")]);
    }

    #[test]
    fn malformed_option_lines_count_toward_limit() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let mut script = Vec::new();
        for i in 0..11 {
            script.extend_from_slice(format!("--bogus-{i}\n").as_bytes());
        }
        script.extend_from_slice(b"--\nfoo\n");
        let err = assemble_script(&script, &mut cmd, &mut cfg).unwrap_err();
        assert!(err.to_string().contains("too many option errors"));
    }

    #[test]
    fn a_few_bad_option_lines_are_tolerated() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let argv = assemble_script(b"--bogus\nnot-an-option\n-d\n--\nfoo\n", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert!(cmd.debug);
        assert_eq!(argv, vec![os("foo")]);
    }

    #[test]
    fn decode_failure_aborts_the_script() {
        let mut cmd = Command::default();
        let mut cfg = Config {
            encoding: Encoding::QuotedPrintable,
            ..Config::default()
        };
        assert!(assemble_script(b"--\nfoo\nbad=\n", &mut cmd, &mut cfg).is_err());
    }

    #[test]
    fn help_option_line_stops_assembly() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let mut lines = LineBuffer::new(Cursor::new(b"--help\n--\nfoo\n".to_vec()));
        match assemble(&mut cmd, &mut cfg, &mut lines).unwrap() {
            Assembly::Help(text) => assert!(!text.is_empty()),
            other => panic!("expected help, got {other:?}"),
        }
    }

    #[test]
    fn directory_script_reports_eisdir() {
        let dir = std::env::temp_dir().join(format!("runsh_interp_dir_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        let err = run_script(&mut cmd, &mut cfg, &dir).unwrap_err();
        assert_eq!(err.downcast_ref::<Errno>(), Some(&Errno::EISDIR));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn null_encoded_stream_assembles() {
        let mut cmd = Command::default();
        let mut cfg = Config {
            encoding: Encoding::Null,
            ..Config::default()
        };
        let argv = assemble_script(b"--\0foo bar\0baz\0", &mut cmd, &mut cfg)
            .unwrap()
            .expect("argv");
        assert_eq!(argv, vec![os("foo bar"), os("baz")]);
    }
}
