//! The shared option table.
//!
//! One `argh`-derived table serves both the invoking command line and every
//! option line inside a script: a script line is re-parsed through the same
//! table via a synthetic two-element argument vector, so option syntax is
//! identical in both places.

use std::path::PathBuf;

use argh::FromArgs;

use crate::command::{Command, Config, Encoding, RedirectSpec};

/// Program name used for synthetic per-line parses and in diagnostics.
pub const PROGRAM: &str = "runsh";

/// A script aborts after more than this many malformed option lines.
pub const OPTION_ERROR_LIMIT: usize = 10;

/// Run one program with prepared I/O, directory, and environment, or
/// interpret an argument script that assembles the program's argv one line
/// at a time.
#[derive(FromArgs, Debug, Default)]
pub struct Args {
    /// show version information and exit
    #[argh(switch, short = 'V')]
    pub version: bool,

    /// verbose diagnostics
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// debug diagnostics
    #[argh(switch, short = 'd')]
    pub debug: bool,

    /// run the positional arguments directly instead of a script
    #[argh(switch, short = 'c')]
    pub command: bool,

    /// print the assembled argument vector before running
    #[argh(switch)]
    pub show_argv: bool,

    /// append the invoking trailing arguments after the script arguments
    #[argh(switch)]
    pub append_argv: bool,

    /// run the target in a child process and wait for it
    #[argh(switch)]
    pub fork: bool,

    /// redirect standard input from a file
    #[argh(option, arg_name = "file")]
    pub stdin: Option<String>,

    /// redirect standard output to a file
    #[argh(option, arg_name = "file")]
    pub stdout: Option<String>,

    /// redirect standard output, appending to the file
    #[argh(option, arg_name = "file")]
    pub stdout_append: Option<String>,

    /// redirect standard output, failing if the file exists
    #[argh(option, arg_name = "file")]
    pub stdout_new: Option<String>,

    /// redirect standard error to a file
    #[argh(option, arg_name = "file")]
    pub stderr: Option<String>,

    /// redirect standard error, appending to the file
    #[argh(option, arg_name = "file")]
    pub stderr_append: Option<String>,

    /// redirect standard error, failing if the file exists
    #[argh(option, arg_name = "file")]
    pub stderr_new: Option<String>,

    /// change directory before running
    #[argh(option, arg_name = "dir")]
    pub chdir: Option<PathBuf>,

    /// file creation mask, octal (022) or symbolic (u=rwx,g=rx,o=)
    #[argh(option, arg_name = "mask")]
    pub umask: Option<String>,

    /// set NAME=VALUE in the environment; may be repeated
    #[argh(option, arg_name = "name=value")]
    pub env: Vec<String>,

    /// start from an empty environment
    #[argh(switch)]
    pub clear_env: bool,

    /// close every descriptor at or above this number
    #[argh(option, arg_name = "fd")]
    pub close_from: Option<i32>,

    /// argument line that splices in the invoking trailing arguments
    #[argh(option, arg_name = "string")]
    pub replace: Option<String>,

    /// script encoding: text, null, qp, quoted-printable, or xnn
    #[argh(option, arg_name = "name")]
    pub encoding: Option<Encoding>,

    /// script file and its arguments, or the program and its arguments
    /// with --command
    #[argh(positional, greedy)]
    pub rest: Vec<String>,
}

/// Result of parsing one script option line.
#[derive(Debug)]
pub enum ParsedLine {
    Options(Box<Args>),
    /// `-h`/`--help` inside a script: usage text to print before stopping.
    Help(String),
}

/// Parse one `-`-prefixed script line through the shared option table.
///
/// The line is presented as a synthetic `[PROGRAM, line]` argument vector,
/// exactly as if it had been given on the invoking command line.
pub fn parse_line(line: &str) -> Result<ParsedLine, String> {
    match Args::from_args(&[PROGRAM], &[line]) {
        Ok(args) => {
            if let Some(stray) = args.rest.first() {
                return Err(format!("unexpected argument '{stray}'"));
            }
            Ok(ParsedLine::Options(Box::new(args)))
        }
        Err(early) => match early.status {
            Ok(()) => Ok(ParsedLine::Help(early.output)),
            Err(()) => Err(early.output),
        },
    }
}

impl Args {
    /// Fold this parse into the command and run configuration.
    ///
    /// Switches accumulate; valued options overwrite. Side effects (chdir,
    /// umask, redirections, close-from) are only recorded here and applied
    /// later, in one fixed safe order, by `setup::prepare`.
    pub fn apply(&self, cmd: &mut Command, cfg: &mut Config) {
        if self.verbose {
            cmd.verbose = true;
        }
        if self.debug {
            cmd.debug = true;
        }
        if self.command {
            cfg.command = true;
        }
        if self.show_argv {
            cfg.show_argv = true;
        }
        if self.append_argv {
            cfg.append_argv = true;
        }
        if self.fork {
            cmd.fork = true;
        }
        if let Some(file) = &self.stdin {
            cmd.stdin = Some(PathBuf::from(file));
        }
        for (file, append, must_not_exist) in [
            (&self.stdout, false, false),
            (&self.stdout_append, true, false),
            (&self.stdout_new, false, true),
        ] {
            if let Some(file) = file {
                cmd.stdout = Some(RedirectSpec {
                    file: PathBuf::from(file),
                    append,
                    must_not_exist,
                });
            }
        }
        for (file, append, must_not_exist) in [
            (&self.stderr, false, false),
            (&self.stderr_append, true, false),
            (&self.stderr_new, false, true),
        ] {
            if let Some(file) = file {
                cmd.stderr = Some(RedirectSpec {
                    file: PathBuf::from(file),
                    append,
                    must_not_exist,
                });
            }
        }
        if let Some(dir) = &self.chdir {
            cmd.chdir = Some(dir.clone());
        }
        if let Some(mask) = &self.umask {
            cmd.umask = Some(mask.clone());
        }
        if self.clear_env {
            cmd.clear_env = true;
        }
        cmd.env_set.extend(self.env.iter().cloned());
        if let Some(fd) = self.close_from {
            cmd.close_from = Some(fd);
        }
        if let Some(marker) = &self.replace {
            cfg.replace = Some(marker.clone());
        }
        if let Some(encoding) = self.encoding {
            cfg.encoding = encoding;
        }

        // Debug implies verbose, and verbose implies showing the argv.
        cmd.verbose = cmd.verbose || cmd.debug;
        cfg.show_argv = cfg.show_argv || cmd.verbose;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_line(line: &str) -> (Command, Config) {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        match parse_line(line).unwrap() {
            ParsedLine::Options(args) => args.apply(&mut cmd, &mut cfg),
            other => panic!("expected options, got {other:?}"),
        }
        (cmd, cfg)
    }

    #[test]
    fn short_debug_flag_parses() {
        let (cmd, _) = apply_line("-d");
        assert!(cmd.debug);
        assert!(cmd.verbose, "debug implies verbose");
    }

    #[test]
    fn long_options_parse_with_equals_value() {
        let (cmd, _) = apply_line("--stdout=out.log");
        let spec = cmd.stdout.expect("stdout spec recorded");
        assert_eq!(spec.file, PathBuf::from("out.log"));
        assert!(!spec.append);
        assert!(!spec.must_not_exist);
    }

    #[test]
    fn stdout_variants_record_flags() {
        let (cmd, _) = apply_line("--stdout-append=out.log");
        assert!(cmd.stdout.unwrap().append);
        let (cmd, _) = apply_line("--stdout-new=out.log");
        assert!(cmd.stdout.unwrap().must_not_exist);
    }

    #[test]
    fn encoding_and_replace_land_in_config() {
        let (_, cfg) = apply_line("--encoding=xnn");
        assert_eq!(cfg.encoding, Encoding::HexEscape);
        let (_, cfg) = apply_line("--replace=%%ARGS%%");
        assert_eq!(cfg.replace.as_deref(), Some("%%ARGS%%"));
    }

    #[test]
    fn unset_encoding_does_not_clobber_config() {
        let mut cmd = Command::default();
        let mut cfg = Config {
            encoding: Encoding::Null,
            ..Config::default()
        };
        match parse_line("--fork").unwrap() {
            ParsedLine::Options(args) => args.apply(&mut cmd, &mut cfg),
            other => panic!("expected options, got {other:?}"),
        }
        assert!(cmd.fork);
        assert_eq!(cfg.encoding, Encoding::Null);
    }

    #[test]
    fn unknown_option_is_an_error() {
        assert!(parse_line("--no-such-option").is_err());
        assert!(parse_line("-Z").is_err());
    }

    #[test]
    fn option_missing_value_is_an_error() {
        // A value must be attached with '=' on a script line; a bare
        // "--stdout" has nowhere to take its argument from.
        assert!(parse_line("--stdout").is_err());
    }

    #[test]
    fn help_line_is_reported_as_help() {
        assert!(matches!(parse_line("--help"), Ok(ParsedLine::Help(_))));
    }

    #[test]
    fn env_options_accumulate() {
        let mut cmd = Command::default();
        let mut cfg = Config::default();
        for line in ["--env=A=1", "--env=B=2"] {
            match parse_line(line).unwrap() {
                ParsedLine::Options(args) => args.apply(&mut cmd, &mut cfg),
                other => panic!("expected options, got {other:?}"),
            }
        }
        assert_eq!(cmd.env_set, vec!["A=1".to_string(), "B=2".to_string()]);
    }

    #[test]
    fn top_level_parse_collects_trailing_arguments() {
        let args = Args::from_args(&[PROGRAM], &["--fork", "script.ush", "x", "-y"])
            .expect("parse");
        assert!(args.fork);
        assert_eq!(args.rest, vec!["script.ush", "x", "-y"]);
    }
}
