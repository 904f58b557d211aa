//! kroot guest bootstrap - runs inside the VM before the user's command.
//!
//! The host launcher never asks the VM to run the user's command directly.
//! It runs `kroot-guest` instead, passing the invoking user's identity and
//! the real command as trailing arguments:
//!
//! ```text
//! kroot-guest <username> <uid> <gid> <command> [args...]
//! ```
//!
//! The bootstrapper performs the privileged setup described by a
//! [`BootstrapPlan`], drops to the target identity, and replaces itself with
//! the command (through the display forwarding helper when one is present).

pub mod binfmt;
pub mod bootstrap;
pub mod devices;
pub mod display;
pub mod env;
mod error;
pub mod layout;
pub mod net;
pub mod plan;
pub mod privilege;

pub use bootstrap::Bootstrapper;
pub use error::{GuestError, PlanError};
pub use layout::GuestLayout;
pub use plan::{BootstrapPlan, Step};

use std::ffi::OsString;

/// Identity the workload runs as, taken verbatim from the host's invoking
/// user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestIdentity {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
}

/// Parsed `kroot-guest` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapArgs {
    pub identity: GuestIdentity,
    /// Target command followed by its arguments. Never empty.
    pub command: Vec<String>,
}

impl BootstrapArgs {
    /// Number of positional arguments after `argv[0]` the guest requires.
    pub const MIN_ARGS: usize = 4;

    /// Parse a full argv, including `argv[0]`.
    pub fn parse<I, T>(argv: I) -> Result<Self, GuestError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args = argv
            .into_iter()
            .skip(1)
            .map(|arg| {
                arg.into().into_string().map_err(|arg| {
                    GuestError::InvalidArguments(format!("argument {arg:?} is not valid UTF-8"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if args.len() < Self::MIN_ARGS {
            return Err(GuestError::InvalidArguments(format!(
                "expected <username> <uid> <gid> <command> [args...], got {} argument(s)",
                args.len()
            )));
        }

        let mut args = args.into_iter();
        let username = args.next().unwrap_or_default();
        let uid = parse_id("uid", args.next())?;
        let gid = parse_id("gid", args.next())?;
        let command: Vec<String> = args.collect();

        if username.is_empty() {
            return Err(GuestError::InvalidArguments("empty username".to_string()));
        }

        Ok(Self {
            identity: GuestIdentity { username, uid, gid },
            command,
        })
    }
}

fn parse_id(what: &str, value: Option<String>) -> Result<u32, GuestError> {
    let value = value.unwrap_or_default();
    value
        .parse::<u32>()
        .map_err(|e| GuestError::InvalidArguments(format!("invalid {what} {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("/usr/bin/kroot-guest")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_minimal() {
        let parsed = BootstrapArgs::parse(argv(&["alice", "1000", "1000", "bash"])).unwrap();

        assert_eq!(
            parsed.identity,
            GuestIdentity {
                username: "alice".to_string(),
                uid: 1000,
                gid: 1000,
            }
        );
        assert_eq!(parsed.command, vec!["bash"]);
    }

    #[test]
    fn test_parse_keeps_command_args_in_order() {
        let parsed =
            BootstrapArgs::parse(argv(&["bob", "1001", "100", "ls", "-l", "--color=never"]))
                .unwrap();

        assert_eq!(parsed.identity.gid, 100);
        assert_eq!(parsed.command, vec!["ls", "-l", "--color=never"]);
    }

    #[test]
    fn test_parse_rejects_too_few_arguments() {
        for args in [
            &[][..],
            &["alice"][..],
            &["alice", "1000"][..],
            &["alice", "1000", "1000"][..],
        ] {
            let err = BootstrapArgs::parse(argv(args)).unwrap_err();
            assert!(matches!(err, GuestError::InvalidArguments(_)), "{args:?}");
            assert_eq!(err.exit_code(), 255);
        }
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        let err = BootstrapArgs::parse(argv(&["alice", "-1", "1000", "bash"])).unwrap_err();
        assert!(matches!(err, GuestError::InvalidArguments(_)));

        let err = BootstrapArgs::parse(argv(&["alice", "1000", "staff", "bash"])).unwrap_err();
        assert!(matches!(err, GuestError::InvalidArguments(_)));
    }

    #[test]
    fn test_parse_rejects_empty_username() {
        let err = BootstrapArgs::parse(argv(&["", "1000", "1000", "bash"])).unwrap_err();
        assert!(matches!(err, GuestError::InvalidArguments(_)));
    }
}
