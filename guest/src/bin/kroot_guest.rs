//! kroot-guest - first process the VM runs.
//!
//! Usage:
//!   kroot-guest <username> <uid> <gid> <command> [args...]
//!
//! Performs privileged setup, drops to `<uid>:<gid>` and replaces itself
//! with `<command>`.

use kroot_guest::privilege::ProcessCredentials;
use kroot_guest::{BootstrapArgs, BootstrapPlan, Bootstrapper, GuestLayout, display};
use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let args = match BootstrapArgs::parse(env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("kroot-guest: {e}, bailing out");
            return ExitCode::from(e.exit_code());
        }
    };

    tracing::debug!(
        user = %args.identity.username,
        uid = args.identity.uid,
        gid = args.identity.gid,
        command = ?args.command,
        "bootstrapping"
    );

    let layout = GuestLayout::default();
    let mut bootstrapper = Bootstrapper::new(&layout, &args.identity, ProcessCredentials);
    let environment = match bootstrapper.run(&BootstrapPlan::default()) {
        Ok(environment) => environment,
        Err(e) => {
            eprintln!("kroot-guest: {e}, bailing out");
            return ExitCode::from(e.exit_code());
        }
    };

    // Does not return on success.
    let err = display::launch(&layout, &args.command, &environment);
    eprintln!("kroot-guest: {err}");
    ExitCode::from(err.exit_code())
}
