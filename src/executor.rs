//! Runs the target program: either by replacing the current process image,
//! or by forking a child that does so while the parent waits.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;

use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use thiserror::Error;
use tracing::info;

use crate::command::{ChildState, Command, ExitCode};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot execute '{path}': {errno}")]
    Exec { path: String, errno: Errno },
    #[error("argument contains an interior NUL byte")]
    NulArg,
    #[error("fork failed: {0}")]
    Fork(Errno),
    #[error("wait failed: {0}")]
    Wait(Errno),
}

impl ExecError {
    /// Exit status the launcher reports when the target could not be run.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ExecError::Exec { errno, .. } => *errno as ExitCode,
            _ => 2,
        }
    }
}

/// Run the command per its fork flag.
///
/// In replace mode a successful exec never returns, so any return at all is
/// a failure. In fork mode the parent waits for the child's terminal status
/// and returns its exit code, mapping a signal death to `128 + signo`.
pub fn run_program(cmd: &mut Command) -> Result<ExitCode, ExecError> {
    if cmd.fork {
        run_child_program(cmd)
    } else {
        Err(exec_program(cmd))
    }
}

fn exec_argv(cmd: &Command) -> Result<(CString, Vec<CString>), ExecError> {
    let path = CString::new(cmd.path.as_bytes()).map_err(|_| ExecError::NulArg)?;
    let argv = cmd
        .argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ExecError::NulArg)?;
    Ok((path, argv))
}

/// Replace the current process image. Only returns on failure.
fn exec_program(cmd: &Command) -> ExecError {
    let (path, argv) = match exec_argv(cmd) {
        Ok(prepared) => prepared,
        Err(e) => return e,
    };
    let errno = match nix::unistd::execvp(&path, &argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    ExecError::Exec {
        path: cmd.path.to_string_lossy().into_owned(),
        errno,
    }
}

fn run_child_program(cmd: &mut Command) -> Result<ExitCode, ExecError> {
    // SAFETY: the child calls exec immediately; on failure it only writes a
    // diagnostic and exits, never returning into the caller.
    match unsafe { fork() }.map_err(ExecError::Fork)? {
        ForkResult::Child => {
            let err = exec_program(cmd);
            eprintln!("runsh: {err}");
            std::process::exit(err.exit_code());
        }
        ForkResult::Parent { child } => {
            cmd.child = Some(child);
            cmd.state = ChildState::Running;
            if cmd.verbose {
                info!("child pid={}", child.as_raw());
            }
            let code = wait_cmd(cmd, child)?;
            cmd.rc = code;
            Ok(code)
        }
    }
}

/// Wait until the child reaches a terminal state, ignoring stop/continue
/// notifications, and record the raw status.
fn wait_cmd(cmd: &mut Command, child: Pid) -> Result<ExitCode, ExecError> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                cmd.state = ChildState::Exited(code);
                if cmd.verbose {
                    info!("child exited with status {code}");
                }
                return Ok(code);
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                let signo = signal as i32;
                cmd.state = ChildState::Signaled(signo);
                if cmd.verbose {
                    info!("child terminated by signal {signo}");
                }
                return Ok(128 + signo);
            }
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(ExecError::Wait(e)),
        }
    }
}
