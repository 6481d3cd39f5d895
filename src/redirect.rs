//! Standard-stream redirection and descriptor hygiene.
//!
//! Redirections open the target file, install its descriptor onto the fixed
//! standard slot with `dup2`, and close the original. `close_from` closes
//! every descriptor at or above a threshold, preferring the descriptor
//! listing in `/proc/self/fd` over probing the whole resource-limit range.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::resource::{Resource, getrlimit};
use nix::unistd::{close, dup2};
use tracing::{debug, error, warn};

use crate::command::{Command, RedirectSpec};

const STDIN_FD: RawFd = 0;
const STDOUT_FD: RawFd = 1;
const STDERR_FD: RawFd = 2;

fn io_errno(err: &std::io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(Errno::EIO as i32))
}

/// Redirect standard input to read from `file`.
pub fn set_stdin(cmd: &mut Command, file: &Path) -> Result<(), Errno> {
    cmd.stdin = Some(file.to_path_buf());
    let opened = File::open(file).map_err(|e| {
        let errno = io_errno(&e);
        error!("cannot open '{}' for stdin: {errno}", file.display());
        cmd.record_ioerr(errno);
        errno
    })?;
    install(cmd, opened, STDIN_FD)
}

/// Redirect standard output per `spec`.
pub fn set_stdout(cmd: &mut Command, spec: &RedirectSpec) -> Result<(), Errno> {
    let spec = spec.clone();
    let opened = open_output(cmd, &spec)?;
    cmd.stdout = Some(spec);
    install(cmd, opened, STDOUT_FD)
}

/// Redirect standard error per `spec`.
pub fn set_stderr(cmd: &mut Command, spec: &RedirectSpec) -> Result<(), Errno> {
    let spec = spec.clone();
    let opened = open_output(cmd, &spec)?;
    cmd.stderr = Some(spec);
    install(cmd, opened, STDERR_FD)
}

/// Open an output redirection target. Create without truncating, owner
/// read/write only; `must_not_exist` makes an existing file an error.
fn open_output(cmd: &mut Command, spec: &RedirectSpec) -> Result<File, Errno> {
    let mut opts = OpenOptions::new();
    opts.write(true).mode(0o600);
    if spec.must_not_exist {
        opts.create_new(true);
    } else {
        opts.create(true);
    }
    if spec.append {
        opts.append(true);
    }
    opts.open(&spec.file).map_err(|e| {
        let errno = io_errno(&e);
        if errno == Errno::EEXIST {
            error!("file '{}' already exists", spec.file.display());
        } else {
            error!("cannot open '{}': {errno}", spec.file.display());
        }
        cmd.record_ioerr(errno);
        errno
    })
}

/// Duplicate `file`'s descriptor onto the standard slot, then close the
/// original. A duplicate that lands anywhere other than the target slot is
/// recorded as an anomaly but is not an error.
fn install(cmd: &mut Command, file: File, target: RawFd) -> Result<(), Errno> {
    let new_fd = dup2(file.as_raw_fd(), target).map_err(|e| {
        cmd.record_ioerr(e);
        e
    })?;
    if new_fd != target {
        warn!("dup2 returned descriptor {new_fd}, expected {target}");
        cmd.surprise = true;
    }
    drop(file);
    Ok(())
}

fn close_quiet(fd: RawFd) -> Result<(), Errno> {
    match close(fd) {
        Ok(()) | Err(Errno::EBADF) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Close every file descriptor numbered `fd_lo` or above.
///
/// Stops at the first close failure that is not "already closed" and
/// reports its code.
pub fn close_from(fd_lo: RawFd) -> Result<(), Errno> {
    // Close fd_lo itself right away as a hedge against the descriptor
    // listing failing because every descriptor is already in use.
    close_quiet(fd_lo)?;
    // At the top of the descriptor number range there is nothing above
    // fd_lo left to close.
    let Some(lo) = fd_lo.checked_add(1) else {
        return Ok(());
    };
    match std::fs::read_dir("/proc/self/fd") {
        Ok(entries) => close_from_listing(entries, lo),
        Err(_) => close_from_all(lo),
    }
}

/// Close only the descriptors that are actually open, per the listing.
fn close_from_listing(entries: std::fs::ReadDir, lo: RawFd) -> Result<(), Errno> {
    let mut fds: Vec<RawFd> = Vec::new();
    for entry in entries.flatten() {
        if let Some(fd) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            if fd >= lo {
                fds.push(fd);
            }
        }
    }
    // The listing's own descriptor is closed here, before any of the
    // collected descriptors are. It may still appear in the list; the
    // resulting EBADF is ignored.
    debug!("close_from: {} descriptors >= {lo}", fds.len());
    for fd in fds {
        close_quiet(fd)?;
    }
    Ok(())
}

/// Brute-force fallback: probe every descriptor up to the resource limit.
fn close_from_all(lo: RawFd) -> Result<(), Errno> {
    let (_, hard) = getrlimit(Resource::RLIMIT_NOFILE)?;
    let max_fd = i32::try_from(hard).unwrap_or(i32::MAX);
    for fd in lo..max_fd {
        close_quiet(fd)?;
    }
    Ok(())
}
