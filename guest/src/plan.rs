//! Ordered bootstrap steps and the constraints between them.
//!
//! Each [`Step`] declares which steps must already have run and whether it
//! still needs the elevated privilege the guest starts with. A
//! [`BootstrapPlan`] is only executed after [`BootstrapPlan::validate`]
//! confirms its order honors every declaration.

use crate::error::PlanError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// tmpfs on the runtime dir, resolver clone-mount, binfmt_misc.
    MountFilesystems,
    /// Foreign-architecture interpreter registration.
    RegisterBinfmt,
    /// DHCP client and hostname.
    ConfigureNetwork,
    /// chown of GPU and audio device nodes to the target user.
    FixDeviceOwnership,
    /// setgid then setuid.
    DropPrivileges,
    /// Runtime dir, HOME and driver overrides.
    PrepareEnvironment,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::MountFilesystems,
        Step::RegisterBinfmt,
        Step::ConfigureNetwork,
        Step::FixDeviceOwnership,
        Step::DropPrivileges,
        Step::PrepareEnvironment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::MountFilesystems => "mount-filesystems",
            Step::RegisterBinfmt => "register-binfmt",
            Step::ConfigureNetwork => "configure-network",
            Step::FixDeviceOwnership => "fix-device-ownership",
            Step::DropPrivileges => "drop-privileges",
            Step::PrepareEnvironment => "prepare-environment",
        }
    }

    /// Steps that must have run before this one.
    pub fn prerequisites(self) -> &'static [Step] {
        match self {
            // binfmt_misc must be mounted before anything is registered.
            Step::RegisterBinfmt => &[Step::MountFilesystems],
            // dhclient rewrites resolv.conf, which must be the guest's copy.
            Step::ConfigureNetwork => &[Step::MountFilesystems],
            // The runtime dir is created as, and owned by, the target user.
            Step::PrepareEnvironment => &[Step::DropPrivileges],
            Step::MountFilesystems | Step::FixDeviceOwnership | Step::DropPrivileges => &[],
        }
    }

    /// Whether the step must run while the guest still holds root.
    pub fn needs_privilege(self) -> bool {
        match self {
            Step::MountFilesystems
            | Step::RegisterBinfmt
            | Step::ConfigureNetwork
            | Step::FixDeviceOwnership
            | Step::DropPrivileges => true,
            Step::PrepareEnvironment => false,
        }
    }

    /// Fatal steps abort the bootstrap; the rest degrade to a warning.
    pub fn is_fatal(self) -> bool {
        matches!(self, Step::MountFilesystems | Step::DropPrivileges)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPlan {
    steps: Vec<Step>,
}

impl BootstrapPlan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen: Vec<Step> = Vec::with_capacity(self.steps.len());

        for &step in &self.steps {
            if seen.contains(&step) {
                return Err(PlanError::Duplicate { step });
            }

            if let Some(&requires) = step
                .prerequisites()
                .iter()
                .find(|required| !seen.contains(required))
            {
                return Err(PlanError::MissingPrerequisite { step, requires });
            }

            if step.needs_privilege() && seen.contains(&Step::DropPrivileges) {
                return Err(PlanError::AfterPrivilegeDrop { step });
            }

            seen.push(step);
        }

        Ok(())
    }
}

impl Default for BootstrapPlan {
    fn default() -> Self {
        Self::new(Step::ALL.to_vec())
    }
}
