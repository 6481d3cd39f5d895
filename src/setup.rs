//! Pre-exec side effects: directory, umask, environment, redirections,
//! descriptor hygiene.
//!
//! None of these can be rolled back once the process image is replaced, so
//! they are applied in one fixed order, strictly before exec: chdir, umask,
//! environment edits, stdin/stdout/stderr redirections, then close-from.
//! The close-from bound therefore can never clobber a descriptor a
//! redirection just installed. Failures accumulate on the command's io-error
//! field and are checked once before execution proceeds.

use nix::errno::Errno;
use nix::sys::stat::{Mode, umask};
use tracing::{debug, error};

use crate::command::Command;
use crate::redirect;

/// Apply every recorded side effect. Failures land on `cmd.ioerr`.
pub fn prepare(cmd: &mut Command) {
    if let Some(dir) = cmd.chdir.clone() {
        if let Err(e) = std::env::set_current_dir(&dir) {
            let errno = Errno::from_raw(e.raw_os_error().unwrap_or(Errno::EIO as i32));
            error!("chdir('{}') failed: {errno}", dir.display());
            cmd.record_ioerr(errno);
        }
    }

    if let Some(mask_str) = cmd.umask.clone() {
        match parse_umask(&mask_str) {
            Ok(mask) => {
                debug!("umask {mask:03o}");
                umask(Mode::from_bits_truncate(mask));
            }
            Err(errno) => {
                error!("invalid umask '{mask_str}': {errno}");
                cmd.record_ioerr(errno);
            }
        }
    }

    apply_env(cmd);

    // Redirections record their own failures on cmd.ioerr.
    if let Some(file) = cmd.stdin.clone() {
        let _ = redirect::set_stdin(cmd, &file);
    }
    if let Some(spec) = cmd.stdout.clone() {
        let _ = redirect::set_stdout(cmd, &spec);
    }
    if let Some(spec) = cmd.stderr.clone() {
        let _ = redirect::set_stderr(cmd, &spec);
    }

    if let Some(fd_lo) = cmd.close_from {
        if fd_lo < 3 {
            error!("--close-from bound {fd_lo} would close a standard stream");
            cmd.record_ioerr(Errno::EDOM);
        } else if let Err(errno) = redirect::close_from(fd_lo) {
            error!("close_from({fd_lo}) failed: {errno}");
            cmd.record_ioerr(errno);
        }
    }
}

fn apply_env(cmd: &mut Command) {
    if cmd.clear_env {
        let keys: Vec<_> = std::env::vars_os().map(|(k, _)| k).collect();
        for key in keys {
            // SAFETY: exactly one thread of control exists until exec.
            unsafe { std::env::remove_var(key) };
        }
    }
    for assignment in cmd.env_set.clone() {
        match split_assignment(&assignment) {
            Some((name, value)) => {
                // SAFETY: exactly one thread of control exists until exec.
                unsafe { std::env::set_var(name, value) };
            }
            None => {
                error!("invalid environment assignment '{assignment}'");
                cmd.record_ioerr(Errno::EINVAL);
            }
        }
    }
}

/// Split `NAME=VALUE`, requiring a valid identifier on the left.
fn split_assignment(kv: &str) -> Option<(&str, &str)> {
    let (name, value) = kv.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, value))
}

/// Parse a umask given in octal (`022`) or symbolic (`u=rwx,g=rx,o=`) form.
pub fn parse_umask(s: &str) -> Result<u32, Errno> {
    if !s.is_empty() && s.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        let mask = u32::from_str_radix(s, 8).map_err(|_| Errno::EINVAL)?;
        if mask > 0o777 {
            return Err(Errno::ERANGE);
        }
        return Ok(mask);
    }
    parse_symbolic_umask(s)
}

/// Symbolic form: comma-separated `u=`, `g=`, `o=` clauses, each listing
/// `rwx` bits at most once, each class given at most once.
fn parse_symbolic_umask(s: &str) -> Result<u32, Errno> {
    let mut user: Option<u32> = None;
    let mut group: Option<u32> = None;
    let mut other: Option<u32> = None;

    let mut it = s.chars().peekable();
    while let Some(class) = it.next() {
        let slot = match class {
            'u' => &mut user,
            'g' => &mut group,
            'o' => &mut other,
            _ => return Err(Errno::EINVAL),
        };
        if slot.is_some() {
            return Err(Errno::EINVAL);
        }
        if it.next() != Some('=') {
            return Err(Errno::EINVAL);
        }
        let mut bits = 0u32;
        while let Some(&c) = it.peek() {
            if c == ',' {
                break;
            }
            let bit = match c {
                'r' => 4,
                'w' => 2,
                'x' => 1,
                _ => return Err(Errno::EINVAL),
            };
            if bits & bit != 0 {
                return Err(Errno::EINVAL);
            }
            bits |= bit;
            it.next();
        }
        *slot = Some(bits);
        if it.peek() == Some(&',') {
            it.next();
        }
    }

    Ok((user.unwrap_or(0) << 6) | (group.unwrap_or(0) << 3) | other.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_umask_parses() {
        assert_eq!(parse_umask("022"), Ok(0o022));
        assert_eq!(parse_umask("0"), Ok(0));
        assert_eq!(parse_umask("777"), Ok(0o777));
    }

    #[test]
    fn octal_umask_out_of_range() {
        assert_eq!(parse_umask("1777"), Err(Errno::ERANGE));
    }

    #[test]
    fn symbolic_umask_parses() {
        assert_eq!(parse_umask("u=rwx,g=rx,o="), Ok(0o750));
        assert_eq!(parse_umask("u=rw"), Ok(0o600));
        assert_eq!(parse_umask("o=x"), Ok(0o001));
    }

    #[test]
    fn symbolic_umask_rejects_repeats_and_junk() {
        assert_eq!(parse_umask("u=rr"), Err(Errno::EINVAL));
        assert_eq!(parse_umask("u=rwx,u=r"), Err(Errno::EINVAL));
        assert_eq!(parse_umask("z=r"), Err(Errno::EINVAL));
        assert_eq!(parse_umask("u+r"), Err(Errno::EINVAL));
        assert_eq!(parse_umask("8"), Err(Errno::EINVAL));
    }

    #[test]
    fn assignment_validation() {
        assert_eq!(split_assignment("FOO=bar"), Some(("FOO", "bar")));
        assert_eq!(split_assignment("_X=1"), Some(("_X", "1")));
        assert_eq!(split_assignment("A_B2=v=w"), Some(("A_B2", "v=w")));
        assert_eq!(split_assignment("1AB=x"), None);
        assert_eq!(split_assignment("A-B=x"), None);
        assert_eq!(split_assignment("NOVALUE"), None);
        assert_eq!(split_assignment("=x"), None);
    }
}
