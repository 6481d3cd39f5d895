use std::ffi::OsString;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use runsh::command::{Command, Config, ExitCode};
use runsh::executor::{self, ExecError};
use runsh::interpreter;
use runsh::options::{Args, PROGRAM};
use runsh::setup;

fn main() {
    let args: Args = argh::from_env();
    if args.version {
        println!("{PROGRAM} {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let mut cmd = Command::default();
    let mut cfg = Config::default();

    // Debug and verbose can come from the environment, so that options for
    // the launcher itself are less likely to be confused with options meant
    // for the program being executed.
    if std::env::var_os("RUNSH_DEBUG").is_some() {
        cmd.debug = true;
        cmd.verbose = true;
    }
    if std::env::var_os("RUNSH_VERBOSE").is_some() {
        cmd.verbose = true;
    }
    args.apply(&mut cmd, &mut cfg);

    init_tracing(&cmd);

    match run(&args, &mut cmd, &mut cfg) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{PROGRAM}: {err:#}");
            // Errors that carry an OS error code exit with it, the way a
            // failed exec does.
            let code = if let Some(exec) = err.downcast_ref::<ExecError>() {
                exec.exit_code()
            } else if let Some(errno) = err.downcast_ref::<nix::errno::Errno>() {
                *errno as ExitCode
            } else {
                1
            };
            process::exit(code);
        }
    }
}

/// Diagnostics go to stderr; the level follows the debug/verbose flags
/// unless `RUST_LOG` says otherwise.
fn init_tracing(cmd: &Command) {
    let level = if cmd.debug {
        "debug"
    } else if cmd.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(args: &Args, cmd: &mut Command, cfg: &mut Config) -> Result<ExitCode> {
    if args.rest.is_empty() {
        eprintln!("{PROGRAM}: must supply at least a command or script name");
        return Ok(2);
    }

    if cfg.command {
        // Direct mode: the positional arguments are the program and its argv.
        cmd.set_target(args.rest.iter().map(OsString::from).collect());
        setup::prepare(cmd);
        if let Some(errno) = cmd.ioerr {
            eprintln!("{PROGRAM}: i/o setup failed: {errno}");
            return Ok(2);
        }
        if cfg.show_argv {
            interpreter::show_argv(cmd);
        }
        Ok(executor::run_program(cmd)?)
    } else {
        // Script mode: the first positional argument names the script; the
        // remainder are the invoking trailing arguments available to the
        // replace marker and to --append-argv.
        cmd.argv = args.rest.iter().map(OsString::from).collect();
        let script = PathBuf::from(&args.rest[0]);
        debug!("script={}", script.display());
        interpreter::run_script(cmd, cfg, &script)
    }
}
