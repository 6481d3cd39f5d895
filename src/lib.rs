//! A minimal process launcher.
//!
//! This crate runs exactly one target program, either by replacing the
//! current process image or by forking a child and waiting for it, after
//! applying option-controlled I/O redirection, directory, umask, and
//! environment changes and closing stray file descriptors. Alternatively it
//! interprets a line-oriented script in which each line supplies one option
//! or one argument, optionally encoded (plain text, NUL-delimited,
//! quoted-printable, or hex-escape), and runs the program that assembles.
//!
//! It is intentionally small: no pipes, no globbing, no variable expansion,
//! no subshells. The script format is a flat list of option lines, a `--`
//! separator, then argument lines, nothing recursive.
//!
//! The high-level entry points are [`interpreter::run_script`] for script
//! input and [`executor::run_program`] for a fully assembled [`Command`].

pub mod argvec;
pub mod command;
pub mod decode;
pub mod executor;
pub mod interpreter;
pub mod options;
pub mod reader;
pub mod redirect;
pub mod setup;

pub use command::{Command, Config, Encoding, ExitCode};
pub use executor::ExecError;
