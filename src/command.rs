use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::unistd::Pid;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// How the bytes of a script line are to be interpreted.
///
/// `Text` and `Null` are identity transforms that differ only in the line
/// delimiter; the other two are decoded after a newline-terminated read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Text,
    Null,
    QuotedPrintable,
    HexEscape,
}

impl Encoding {
    /// The line delimiter the reader uses for this encoding.
    pub fn delimiter(self) -> u8 {
        match self {
            Encoding::Null => b'\0',
            _ => b'\n',
        }
    }
}

impl argh::FromArgValue for Encoding {
    fn from_arg_value(value: &str) -> Result<Self, String> {
        match value {
            "text" => Ok(Encoding::Text),
            "null" => Ok(Encoding::Null),
            "qp" | "quoted-printable" => Ok(Encoding::QuotedPrintable),
            "xnn" => Ok(Encoding::HexEscape),
            other => Err(format!(
                "unknown encoding '{other}' (expected text, null, qp, or xnn)"
            )),
        }
    }
}

/// Target file for one of the output streams.
#[derive(Debug, Clone, Default)]
pub struct RedirectSpec {
    pub file: PathBuf,
    pub append: bool,
    pub must_not_exist: bool,
}

/// Lifecycle of the child process in fork mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildState {
    #[default]
    NotStarted,
    Running,
    Exited(i32),
    Signaled(i32),
}

/// One program invocation.
///
/// Built once per top-level run, mutated incrementally as options are
/// processed (from the command line or from script option lines), then read
/// by the executor. Setup failures accumulate in `ioerr` and are checked
/// once before anything is executed.
#[derive(Debug, Default)]
pub struct Command {
    pub argv: Vec<OsString>,
    pub path: OsString,
    pub name: OsString,
    pub fork: bool,

    pub verbose: bool,
    pub debug: bool,

    // Actions applied after fork(), if any, and before exec().
    pub stdin: Option<PathBuf>,
    pub stdout: Option<RedirectSpec>,
    pub stderr: Option<RedirectSpec>,
    pub chdir: Option<PathBuf>,
    pub umask: Option<String>,
    pub clear_env: bool,
    pub env_set: Vec<String>,
    pub close_from: Option<i32>,
    pub ioerr: Option<Errno>,
    /// dup2 handed back a descriptor other than the standard slot.
    pub surprise: bool,

    // State
    pub child: Option<Pid>,
    pub state: ChildState,
    pub rc: ExitCode,
}

impl Command {
    /// Install the assembled argument vector; `argv[0]` becomes the resolved
    /// path and its basename the command name.
    pub fn set_target(&mut self, argv: Vec<OsString>) {
        if let Some(first) = argv.first() {
            self.path = first.clone();
            self.name = basename(&self.path);
        }
        self.argv = argv;
    }

    /// Record a setup error. The most recent error wins; it is inspected
    /// once, before execution proceeds.
    pub fn record_ioerr(&mut self, err: Errno) {
        self.ioerr = Some(err);
    }
}

/// Settings that steer the run as a whole rather than the target command:
/// script encoding, the replace marker, and the append/show toggles.
///
/// Threaded explicitly through option processing and the interpreter, so a
/// script option line can still adjust it mid-run.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub command: bool,
    pub encoding: Encoding,
    pub replace: Option<String>,
    pub append_argv: bool,
    pub show_argv: bool,
}

/// Final path component, byte-wise, without consulting the filesystem.
pub fn basename(path: &OsStr) -> OsString {
    let bytes = path.as_bytes();
    match bytes.iter().rposition(|&b| b == b'/') {
        Some(i) => OsStr::from_bytes(&bytes[i + 1..]).to_owned(),
        None => path.to_owned(),
    }
}
